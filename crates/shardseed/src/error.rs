// We follow the same approach as the rest of our code: the internal no_std
// crate returns `&'static str` and this crate wraps those messages in a
// proper error type.
//
// Every error that can occur during a seeding run is reported through the
// single opaque `Error` type. We don't expose `ErrorKind` (for now), which
// leaves us free to reorganize the payloads.
//
// An important subtlety for the distributed calculation: most precondition
// errors get constructed from values that were exchanged through a
// collective, which means that every shard constructs the same error at the
// same point of the run (and nobody is left waiting inside a collective).

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The underlying internal error type
#[non_exhaustive]
#[derive(Clone, Debug)]
enum ErrorKind {
    /// An error that occurs when the requested number of clusters is missing
    /// or lies outside of `[1, total_rows]`
    ClusterCount(ClusterCountError),
    /// An error that occurs when a raw trial count is neither `-1` nor
    /// positive
    TrialCount(TrialCountError),
    /// An error that occurs when some shard doesn't own any rows
    EmptyShard(EmptyShardError),
    /// An error that occurs when shards disagree about the number of features
    /// (or when there are no features at all)
    FeatureCount(FeatureCountError),
    /// An error that occurs when an unknown strategy name is specified
    StrategyName(StrategyNameError),
    /// An error that occurs when the potential becomes NaN or infinite
    NonFinitePotential(NonFinitePotentialError),
    /// An error that occurs inside of a collective operation
    Communication(CommunicationError),
    /// An error that occurs when a working buffer can't be allocated
    Allocation(AllocationError),
    /// An error that occurs when a thread pool can't be built
    ThreadPool(ThreadPoolError),
    /// An error that occurs within `shardseed_nostd_internal`
    Internal(InternalError),
}

// define constructor methods for Error
impl Error {
    /// produce an error indicating that the cluster count wasn't specified
    pub(crate) fn cluster_count_missing() -> Self {
        Error {
            kind: ErrorKind::ClusterCount(ClusterCountError {
                actual: None,
                total_rows: None,
            }),
        }
    }

    /// produce an error indicating that the cluster count lies outside of the
    /// acceptable range of values.
    ///
    /// `total_rows` should be `None` when the upper limit isn't known yet
    /// (i.e. while building the parameters)
    pub(crate) fn cluster_count(actual: i64, total_rows: Option<u64>) -> Self {
        Error {
            kind: ErrorKind::ClusterCount(ClusterCountError {
                actual: Some(actual),
                total_rows,
            }),
        }
    }

    /// produce an error indicating that a raw trial count is invalid
    pub(crate) fn trial_count(actual: i64) -> Self {
        Error {
            kind: ErrorKind::TrialCount(TrialCountError { actual }),
        }
    }

    /// produce an error indicating that `rank` doesn't own any rows
    pub(crate) fn empty_shard(rank: usize) -> Self {
        Error {
            kind: ErrorKind::EmptyShard(EmptyShardError { rank }),
        }
    }

    /// produce an error indicating that `rank` has a different number of
    /// features than rank 0
    pub(crate) fn feature_count(rank: usize, expected: u64, actual: u64) -> Self {
        Error {
            kind: ErrorKind::FeatureCount(FeatureCountError {
                rank,
                expected,
                actual,
            }),
        }
    }

    /// produce an error indicating that an unknown strategy name was
    /// specified
    pub(crate) fn strategy_name(what: &'static str, actual: String, choices: Vec<String>) -> Self {
        Error {
            kind: ErrorKind::StrategyName(StrategyNameError {
                what,
                actual,
                choices,
            }),
        }
    }

    /// produce an error indicating that the potential isn't finite
    pub(crate) fn non_finite_potential(n_centroids: usize, value: f64) -> Self {
        Error {
            kind: ErrorKind::NonFinitePotential(NonFinitePotentialError { n_centroids, value }),
        }
    }

    /// produce an error describing a failed collective
    pub(crate) fn communication(rank: usize, what: String) -> Self {
        Error {
            kind: ErrorKind::Communication(CommunicationError { rank, what }),
        }
    }

    /// produce an error indicating that a buffer of `len` elements couldn't
    /// be allocated
    pub(crate) fn allocation(what: &'static str, len: Option<usize>) -> Self {
        Error {
            kind: ErrorKind::Allocation(AllocationError { what, len }),
        }
    }

    /// produce an error describing why a thread pool couldn't be built
    pub(crate) fn thread_pool(what: String) -> Self {
        Error {
            kind: ErrorKind::ThreadPool(ThreadPoolError { what }),
        }
    }

    /// wraps an internal error string
    pub(crate) fn internal(message: &'static str) -> Self {
        Error {
            kind: ErrorKind::Internal(InternalError(message)),
        }
    }

    /// Returns whether the error came out of a collective operation.
    ///
    /// Callers that launch many seeding runs may want to tear down a
    /// communicator after such an error (the group is no longer in a
    /// consistent state).
    pub fn is_communication(&self) -> bool {
        matches!(self.kind, ErrorKind::Communication(_))
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for ErrorKind {}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            ErrorKind::ClusterCount(ref err) => err.fmt(f),
            ErrorKind::TrialCount(ref err) => err.fmt(f),
            ErrorKind::EmptyShard(ref err) => err.fmt(f),
            ErrorKind::FeatureCount(ref err) => err.fmt(f),
            ErrorKind::StrategyName(ref err) => err.fmt(f),
            ErrorKind::NonFinitePotential(ref err) => err.fmt(f),
            ErrorKind::Communication(ref err) => err.fmt(f),
            ErrorKind::Allocation(ref err) => err.fmt(f),
            ErrorKind::ThreadPool(ref err) => err.fmt(f),
            ErrorKind::Internal(ref err) => err.fmt(f),
        }
    }
}

/// An error that occurs when the requested number of clusters is missing or
/// lies outside of the acceptable range of values
#[derive(Clone, Debug)]
struct ClusterCountError {
    actual: Option<i64>,
    total_rows: Option<u64>,
}

impl std::error::Error for ClusterCountError {}

impl core::fmt::Display for ClusterCountError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match (self.actual, self.total_rows) {
            (None, _) => write!(f, "the cluster count was not specified"),
            (Some(actual), None) => write!(
                f,
                "the cluster count has a value of {actual}. It must be positive"
            ),
            (Some(actual), Some(total_rows)) => write!(
                f,
                "the cluster count has a value of {actual}. The value should be \
                 no less than 1 and not exceed the total number of rows, {total_rows}"
            ),
        }
    }
}

/// An error that occurs when a raw trial count is neither `-1` nor positive
#[derive(Clone, Debug)]
struct TrialCountError {
    actual: i64,
}

impl std::error::Error for TrialCountError {}

impl core::fmt::Display for TrialCountError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "the trial count has a value of {}. It must be positive (or -1 to \
             request the default)",
            self.actual
        )
    }
}

/// An error that occurs when some shard doesn't own any rows
#[derive(Clone, Debug)]
struct EmptyShardError {
    rank: usize,
}

impl std::error::Error for EmptyShardError {}

impl core::fmt::Display for EmptyShardError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "rank {} doesn't own any rows", self.rank)
    }
}

/// An error that occurs when the shards disagree about the feature count
#[derive(Clone, Debug)]
struct FeatureCountError {
    rank: usize,
    expected: u64,
    actual: u64,
}

impl std::error::Error for FeatureCountError {}

impl core::fmt::Display for FeatureCountError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let FeatureCountError {
            rank,
            expected,
            actual,
        } = self;
        if *expected == 0 {
            write!(f, "the samples must have at least 1 feature")
        } else {
            write!(
                f,
                "rank {rank} has {actual} features, but rank 0 has {expected} features"
            )
        }
    }
}

/// An error that occurs when an unknown strategy name is specified
#[derive(Clone, Debug)]
struct StrategyNameError {
    what: &'static str,
    actual: String,
    choices: Vec<String>,
}

impl std::error::Error for StrategyNameError {}

impl core::fmt::Display for StrategyNameError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "{} is not a {} name. Choices include: {:?}",
            self.actual, self.what, self.choices
        )
    }
}

/// An error that occurs when the potential is NaN or infinite
#[derive(Clone, Debug)]
struct NonFinitePotentialError {
    n_centroids: usize,
    value: f64,
}

impl std::error::Error for NonFinitePotentialError {}

impl core::fmt::Display for NonFinitePotentialError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "the potential became {} after choosing {} centroid(s). Do the \
             samples hold non-finite values?",
            self.value, self.n_centroids
        )
    }
}

/// An error that occurs inside of a collective operation
#[derive(Clone, Debug)]
struct CommunicationError {
    rank: usize,
    what: String,
}

impl std::error::Error for CommunicationError {}

impl core::fmt::Display for CommunicationError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "collective failed on rank {}: {}", self.rank, self.what)
    }
}

/// An error that occurs when a working buffer can't be allocated
#[derive(Clone, Debug)]
struct AllocationError {
    what: &'static str,
    // None when the length itself overflows
    len: Option<usize>,
}

impl std::error::Error for AllocationError {}

impl core::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.len {
            Some(len) => write!(f, "unable to allocate {len} elements for {}", self.what),
            None => write!(f, "the length of {} overflows", self.what),
        }
    }
}

/// An error that occurs when a thread pool can't be built
#[derive(Clone, Debug)]
struct ThreadPoolError {
    what: String,
}

impl std::error::Error for ThreadPoolError {}

impl core::fmt::Display for ThreadPoolError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "unable to build the thread pool: {}", self.what)
    }
}

/// Allocates a buffer of `len` copies of `value`, reporting an error (rather
/// than aborting) when the memory isn't available.
pub(crate) fn try_filled_vec<T: Clone>(
    len: usize,
    value: T,
    what: &'static str,
) -> Result<Vec<T>, Error> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| Error::allocation(what, Some(len)))?;
    out.resize(len, value);
    Ok(out)
}

/// Wraps the string errors from `shardseed_nostd_internal`
#[derive(Clone)]
struct InternalError(&'static str);

impl std::error::Error for InternalError {}

impl core::fmt::Display for InternalError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::fmt::Debug for InternalError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = Error::cluster_count(9, Some(8));
        assert!(err.to_string().contains("not exceed the total number of rows, 8"));
        assert!(!err.is_communication());

        let err = Error::strategy_name("gather policy", "fast".to_owned(), vec!["wide".to_owned()]);
        assert_eq!(
            err.to_string(),
            "fast is not a gather policy name. Choices include: [\"wide\"]"
        );

        let err = Error::communication(2, "timed out".to_owned());
        assert!(err.is_communication());
        assert_eq!(err.to_string(), "collective failed on rank 2: timed out");

        assert_eq!(Error::internal("oops").to_string(), "oops");
    }

    #[test]
    fn oversized_buffers() {
        let err = try_filled_vec(usize::MAX, 0_u64, "the candidate indices").unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("unable to allocate {} elements for the candidate indices", usize::MAX)
        );
        assert_eq!(try_filled_vec(3, 1.5_f64, "norms").unwrap(), [1.5; 3]);
    }
}
