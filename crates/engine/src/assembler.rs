//! Decides when a console response is complete.
//!
//! The console has no framing: a response ends when the provider prints its
//! prompt, or when the text already looks finished. Each heuristic is an
//! independent predicate over the decoded text; [`ResponseAssembler`] applies
//! them in priority order after every chunk, looking only at the newly
//! decoded tail so that assembly stays linear in the response size.

use std::fmt;
use std::time::Duration;

use dubbo_invoke_util::{DecodedText, StreamingDecoder, TextEncoding, decode_response_bytes};

/// Size of one socket read.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Prompt the console prints when it is ready for the next command.
pub const PROMPT_MARKER: &str = "dubbo>";

/// Tail the console appends after an invocation result.
pub const TIMING_MARKERS: [&str; 2] = ["elapsed:", "ms."];

/// Diagnostic phrases that end a response and mark it as a remote failure.
pub const ERROR_PHRASES: [&str; 5] = [
    "Failed to invoke",
    "No such service",
    "No provider",
    "Service not found",
    "Connection refused",
];

/// Consecutive short reads taken as the provider having nothing more to say.
const SHORT_CHUNK_STREAK: usize = 3;

/// Already scanned text that is searched again, longer than any marker.
const MARKER_OVERLAP: usize = 32;

/// A null or empty reply is a few bytes of payload plus console noise.
const NULL_REPLY_LIMIT: usize = 256;

/// Why the assembler stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    PromptAndTiming,
    BusinessNull,
    BalancedStructure,
    ErrorPhrase,
    ShortChunks,
    ReadDeadline,
    /// No heuristic matched but the data stopped: idle deadline or EOF.
    DataStopped,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PromptAndTiming => "prompt-and-timing",
            Self::BusinessNull => "business-null",
            Self::BalancedStructure => "balanced-structure",
            Self::ErrorPhrase => "error-phrase",
            Self::ShortChunks => "short-chunks",
            Self::ReadDeadline => "read-deadline",
            Self::DataStopped => "data-stopped",
        })
    }
}

/// Accumulated response and the reason it was considered complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub bytes: Vec<u8>,
    pub text: String,
    pub encoding: TextEncoding,
    pub completion: CompletionReason,
}

/// Bracket depth from the first `{` or `[`, fed incrementally. Brackets
/// inside string literals are ignored.
#[derive(Debug, Default, Clone)]
struct StructureScan {
    started: bool,
    depth: usize,
    in_string: bool,
    escaped: bool,
    span: usize,
    outcome: Option<bool>,
}

impl StructureScan {
    /// `Some(balanced)` once depth first returns to zero; balanced means the
    /// span is longer than an empty pair.
    fn feed(&mut self, text: &str) -> Option<bool> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        for byte in text.bytes() {
            if !self.started {
                if !matches!(byte, b'{' | b'[') {
                    continue;
                }
                self.started = true;
            }
            self.span += 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        self.outcome = Some(self.span > 2);
                        return self.outcome;
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Accumulation state for one response. Reads are driven elsewhere; this
/// type only sees chunks and the time spent reading them.
#[derive(Debug)]
pub struct ResponseAssembler {
    buffer: Vec<u8>,
    decoder: StreamingDecoder,
    text: String,
    structure: StructureScan,
    saw_prompt: bool,
    saw_timing: bool,
    saw_error: bool,
    short_streak: usize,
    read_deadline: Duration,
    completion: Option<CompletionReason>,
}

impl ResponseAssembler {
    /// Forced completion happens after three times the call timeout.
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            decoder: StreamingDecoder::gbk(),
            text: String::new(),
            structure: StructureScan::default(),
            saw_prompt: false,
            saw_timing: false,
            saw_error: false,
            short_streak: 0,
            read_deadline: call_timeout.saturating_mul(3),
            completion: None,
        }
    }

    /// Appends a chunk and re-evaluates. `reading_for` is the time since the
    /// first byte arrived. Once complete, the reason never changes.
    pub fn push_chunk(&mut self, chunk: &[u8], reading_for: Duration) -> Option<CompletionReason> {
        if self.completion.is_some() {
            return self.completion;
        }
        self.buffer.extend_from_slice(chunk);
        if chunk.len() < READ_BUFFER_SIZE {
            self.short_streak += 1;
        } else {
            self.short_streak = 0;
        }

        let scanned = self.text.len();
        self.decoder.push(chunk, &mut self.text);
        let window = &self.text[window_start(&self.text, scanned)..];
        self.saw_prompt |= window.contains(PROMPT_MARKER);
        self.saw_timing |= TIMING_MARKERS.iter().any(|marker| window.contains(marker));
        self.saw_error |= has_error_phrase(window);
        let balanced = self.structure.feed(&self.text[scanned..]) == Some(true);

        self.completion = if self.saw_prompt && self.saw_timing {
            Some(CompletionReason::PromptAndTiming)
        } else if self.text.len() <= NULL_REPLY_LIMIT && is_business_null(&self.text) {
            Some(CompletionReason::BusinessNull)
        } else if balanced {
            Some(CompletionReason::BalancedStructure)
        } else if self.saw_error {
            Some(CompletionReason::ErrorPhrase)
        } else if self.short_streak >= SHORT_CHUNK_STREAK {
            Some(CompletionReason::ShortChunks)
        } else if reading_for > self.read_deadline {
            Some(CompletionReason::ReadDeadline)
        } else {
            None
        };
        self.completion
    }

    pub fn completion(&self) -> Option<CompletionReason> {
        self.completion
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    /// Final decode of everything received.
    pub fn finish(self) -> RawResponse {
        let completion = self.completion.unwrap_or(CompletionReason::DataStopped);
        let DecodedText { text, encoding } = decode_response_bytes(&self.buffer);
        RawResponse {
            bytes: self.buffer,
            text,
            encoding,
            completion,
        }
    }
}

/// Start of the text to search after a chunk: the new tail plus enough of
/// the old text to catch a marker split across chunks.
fn window_start(text: &str, scanned: usize) -> usize {
    let mut start = scanned.saturating_sub(MARKER_OVERLAP);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    start
}

pub fn has_prompt_and_timing(text: &str) -> bool {
    text.contains(PROMPT_MARKER) && TIMING_MARKERS.iter().any(|marker| text.contains(marker))
}

/// The payload is the literal `null`, or nothing at all before the prompt
/// (a void method).
pub fn is_business_null(text: &str) -> bool {
    let payload = console_payload(text);
    payload == "null" || (payload.is_empty() && text.trim_end().ends_with(PROMPT_MARKER))
}

pub fn has_error_phrase(text: &str) -> bool {
    ERROR_PHRASES.iter().any(|phrase| text.contains(phrase))
}

/// From the first `{` or `[`, the combined depth of both bracket kinds
/// returns to zero and the span is longer than an empty pair. Brackets in
/// string literals do not count.
pub fn has_balanced_structure(text: &str) -> bool {
    StructureScan::default().feed(text) == Some(true)
}

/// Response text with prompts and the timing line removed, trimmed.
pub fn console_payload(text: &str) -> String {
    text.lines()
        .map(|line| strip_prompts(line.trim()))
        .filter(|line| !line.is_empty() && !is_timing_line(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompts only count at either end of a line.
fn strip_prompts(mut line: &str) -> &str {
    loop {
        if let Some(rest) = line.strip_prefix(PROMPT_MARKER) {
            line = rest.trim_start();
        } else if let Some(rest) = line.strip_suffix(PROMPT_MARKER) {
            line = rest.trim_end();
        } else {
            return line;
        }
    }
}

pub fn is_timing_line(line: &str) -> bool {
    let line = line.trim();
    line.starts_with(TIMING_MARKERS[0]) || (line.ends_with(TIMING_MARKERS[1]) && line.len() < 32 && !line.contains(['{', '[']))
}
