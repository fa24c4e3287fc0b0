use patchbay_types::{Args, OutputFormat, ResultKind};

/// Per-request state threaded through the dispatch pipeline.
///
/// Built by validation, updated by dispatch, consumed by the response
/// formatter. The reserved transport parameters live here; everything else
/// ends up in `args`.
#[derive(Debug, Default)]
pub(crate) struct RequestContext {
    /// Requested command name, when the `cmd` parameter was present.
    pub command: Option<String>,
    /// Presented API key, when the `apikey` parameter was present.
    pub apikey: Option<String>,
    /// JSONP callback name. Its presence forces JavaScript output.
    pub callback: Option<String>,
    /// Debug mode: pretty JSON and handler faults surfaced to the caller.
    pub debug: bool,
    /// Log the handler's elapsed time.
    pub profile: bool,
    /// Output format selected via `out_type`.
    pub format: OutputFormat,
    /// Whether the request passed authentication.
    pub authenticated: bool,
    /// Rejection or handler message carried into the envelope.
    pub message: Option<String>,
    /// Classification reported by the handler, `Failed` until then.
    pub kind: ResultKind,
    /// Cleaned parameters. Empty unless the request authenticated.
    pub args: Args,
}
