use futures::StreamExt;

use crate::provider::{FragmentStream, ProviderError};

/// Drains a reply stream, handing the accumulated text to `on_partial` after
/// every fragment. Returns the full reply once the stream ends.
///
/// A stream error is returned as-is; whatever was shown through `on_partial`
/// is the caller's to discard.
pub async fn consume_turn<F>(
    mut fragments: FragmentStream<'_>,
    mut on_partial: F,
) -> Result<String, ProviderError>
where
    F: FnMut(&str),
{
    let mut reply = String::new();
    while let Some(fragment) = fragments.next().await {
        reply.push_str(&fragment?);
        on_partial(&reply);
    }
    Ok(reply)
}
