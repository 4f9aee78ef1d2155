//! Error types for the StoryForge core library.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// Classified errors from the three outbound model-provider adapters
/// (text LLM, image, audio).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network/HTTP error or a retriable HTTP status, after the adapter's
    /// own retry budget has been exhausted.
    #[error("{provider} provider: transient failure after retries: {message}")]
    Transient {
        /// Which provider adapter raised this (`text`, `image`, `audio`).
        provider: &'static str,
        /// Details of the last failure.
        message: String,
    },

    /// Non-retriable 4xx response (other than 408/429) or a malformed
    /// outbound request.
    #[error("{provider} provider: bad request: {message}")]
    BadRequest {
        /// Which provider adapter raised this.
        provider: &'static str,
        /// Details of the error.
        message: String,
    },

    /// A successful HTTP response whose body failed schema validation.
    #[error("{provider} provider: upstream returned a malformed payload: {message}")]
    UpstreamMalformed {
        /// Which provider adapter raised this.
        provider: &'static str,
        /// Details of the parse failure.
        message: String,
    },
}

/// Errors from uploading generated media to the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The target bucket/path could not be written to (permissions, missing
    /// bucket, credential failure).
    #[error("blob store not writable: {message}")]
    NotWritable {
        /// Details of the failure.
        message: String,
    },

    /// The payload was below the minimum size threshold, indicating the
    /// upstream provider returned a degenerate (empty or near-empty) body.
    #[error("invalid blob payload: {message}")]
    InvalidPayload {
        /// Details of why the payload was rejected.
        message: String,
    },
}

/// Errors from the relational repository.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Failed to connect to or initialize the database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// The requested status transition is not legal per the job state
    /// machine, or a unique-constraint invariant (e.g. `(story_id,
    /// sequence)`) was violated.
    #[error("repository conflict: {message}")]
    Conflict {
        /// Details of the conflicting operation.
        message: String,
    },

    /// The requested row does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Details of what was not found.
        message: String,
    },
}

/// Errors from the durable broker client.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Network/connection failure talking to the broker.
    #[error("broker connection error: {message}")]
    Connection {
        /// Details of the failure.
        message: String,
    },

    /// A handle passed to `ack`/`nack` no longer refers to a claimed job
    /// (already acked, or its visibility timeout already expired and was
    /// reclaimed by another worker).
    #[error("broker handle is stale or unknown: {message}")]
    StaleHandle {
        /// Details of the failure.
        message: String,
    },
}

/// Errors surfaced by the dispatcher's `submit` -- the only place this
/// crate's public API hands back an orchestrator-level error directly.
/// Once a job is claimed, the orchestrator classifies failures through its
/// own internal `Failure` enum instead (not part of the public surface);
/// this type only needs to cover what `submit` can actually fail with.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A provider call failed in a way that is not retriable via
    /// redelivery, or an enqueue failure surfaced before the first claim.
    #[error("stage '{stage}' failed fatally: {message}")]
    Fatal {
        /// The pipeline stage that failed (`enqueue` is the only stage
        /// `submit` itself can fail at).
        stage: &'static str,
        /// Details of the failure.
        message: String,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
