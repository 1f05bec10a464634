//! Server-sent-event framing shared by every streaming vendor binding.

use std::collections::VecDeque;

use futures::StreamExt as _;
use futures::stream;

use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::provider::{ProviderEvent, ProviderEventStream};

use super::client::ByteStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// True for empty keep-alives and the OpenAI-style `[DONE]` sentinel.
    pub fn is_terminal_marker(&self) -> bool {
        self.data.trim() == "[DONE]"
    }

    pub fn json(&self, provider: &ProviderId) -> Result<Option<serde_json::Value>, ProviderError> {
        let data = self.data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Ok(None);
        }
        serde_json::from_str(data).map(Some).map_err(|e| {
            ProviderError::protocol(provider, format!("invalid SSE JSON frame: {e}"))
        })
    }
}

#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes = self.buf[..idx].to_vec();
            self.buf.drain(..idx + delim_len);
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a trailing frame that arrived without a closing blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buf);
        parse_sse_frame(&rest)
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Vendor-specific translation from SSE frames to normalized events.
///
/// Mappers are stateful because several vendors spread usage across frames.
pub(crate) trait FrameMapper: Send + 'static {
    fn map_frame(&mut self, frame: &SseFrame) -> Result<Vec<ProviderEvent>, ProviderError>;

    /// Called once after the byte stream ends.
    fn finish(&mut self) -> Result<Vec<ProviderEvent>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Turns a raw HTTP body into a stream of normalized events.
pub(crate) fn sse_event_stream<M: FrameMapper>(
    provider_id: ProviderId,
    bytes_stream: ByteStream,
    mapper: M,
) -> ProviderEventStream {
    struct State<M> {
        provider_id: ProviderId,
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        mapper: M,
        pending: VecDeque<ProviderEvent>,
        done: bool,
    }

    Box::pin(stream::try_unfold(
        State {
            provider_id,
            bytes_stream,
            decoder: SseDecoder::default(),
            mapper,
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => {
                        for frame in state.decoder.push_chunk(&chunk) {
                            state.pending.extend(state.mapper.map_frame(&frame)?);
                        }
                    }
                    Some(Err(e)) => {
                        return Err(ProviderError::transport(
                            state.provider_id.clone(),
                            format!("{} streaming read failed: {e}", state.provider_id),
                        ));
                    }
                    None => {
                        state.done = true;
                        if let Some(frame) = state.decoder.finish() {
                            state.pending.extend(state.mapper.map_frame(&frame)?);
                        }
                        state.pending.extend(state.mapper.finish()?);
                    }
                }
            }
        },
    ))
}
