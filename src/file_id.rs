//! Normalization of user-provided file references.
//!
//! Every subcommand accepts either a bare file id or one of the URL forms
//! people paste from their browser; all of them reduce to the bare id
//! before any request is made.

const SHARE_URL_MARKER: &str = "pixeldrain.com/u/";
const DIRECT_URL_MARKER: &str = "pixeldrain.com/f/";
const REDIRECTOR_MARKER: &str = "href.li/?";

/// Extract a bare file id from a pixeldrain URL, passing anything that
/// does not look like a known URL form through trimmed.
///
/// Redirector-wrapped links are unwrapped recursively, so doubly-wrapped
/// links still resolve to the innermost id.
pub fn parse_file_id(input: &str) -> String {
    let input = input.trim();
    if let Some(idx) = input.rfind(SHARE_URL_MARKER) {
        return input[idx + SHARE_URL_MARKER.len()..].to_owned();
    }
    if let Some(idx) = input.rfind(DIRECT_URL_MARKER) {
        return input[idx + DIRECT_URL_MARKER.len()..].to_owned();
    }
    if let Some(idx) = input.rfind(REDIRECTOR_MARKER) {
        return parse_file_id(&input[idx + REDIRECTOR_MARKER.len()..]);
    }
    input.to_owned()
}
