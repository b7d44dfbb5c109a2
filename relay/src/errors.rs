//! Errors surfaced by the interpreter at runtime.
use thiserror::Error;

/// A type alias for a result with a [RelayError] as the error type.
pub type RelayResult<T> = Result<T, RelayError>;

/// The different ways a machine operation can fail. Compile errors are
/// wrapped from the statechart compiler; everything else is raised
/// synchronously by the operation that hit it.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Wrapper for errors coming from configuration compilation.
    #[error("{0:?}")]
    Compile(#[from] statechart_utils::Error),

    /// An operation that needs a started machine ran before `start`.
    #[error("machine has not been started")]
    NotStarted,

    /// `start` was called a second time.
    #[error("machine has already been started")]
    AlreadyStarted,

    /// `load` was called after `start`.
    #[error("cannot load a snapshot into a started machine")]
    LoadAfterStart,

    /// `rewind` or `forward` was called without time travel enabled.
    #[error("time travel is not enabled for this machine")]
    TimeTravelDisabled,

    /// A snapshot with an empty configuration was loaded.
    #[error("snapshot has an empty configuration")]
    EmptySnapshot,

    /// A snapshot references a state id the compiled tree does not have.
    #[error("snapshot references unknown state `{0}`")]
    UnknownSnapshotState(String),

    /// `dump` was called before the configuration was populated.
    #[error("machine has no active configuration to dump")]
    EmptyConfiguration,

    /// A taken transition's target never resolved at compile time.
    #[error(
        "transition target `{target}` from `{src}` does not resolve to any state"
    )]
    UnresolvedTarget { src: String, target: String },

    /// A guard name with no entry in the registry was evaluated.
    #[error("unknown guard `{0}`")]
    UnknownGuard(String),

    /// A reducer name with no entry in the registry was applied.
    #[error("unknown reducer `{0}`")]
    UnknownReducer(String),

    /// The eventless-transition loop failed to reach a fixpoint. The
    /// machine state is corrupted; rewind or discard it.
    #[error("always-transitions failed to stabilise after {0} microsteps")]
    FixpointDivergence(usize),
}
