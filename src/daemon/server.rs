//! Query socket handling.
//!
//! Speaks the Postfix tcp_table(5) line protocol: `get <key>` answered with
//! `200 <value>`, `500 not found` or `400 <reason>`. Keys and values are
//! `%HH`-encoded on the wire. The same socket answers the `stats` and
//! `jstats` admin commands. One thread per connection; Postfix holds its
//! connection open, so handlers loop until EOF.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;

use crate::config::SharedConfig;
use crate::core::{Mode, Resolved, resolve};
use crate::daemon::stats::StatsRegistry;

/// Longest request line we are willing to buffer.
pub const MAX_LINE: usize = 1024;

/// Optional single-level rewrite applied to the query before resolution and
/// to the reply after it. Selected by the `PROCESSOR` config item.
pub trait Preprocessor: Send + Sync {
    fn rewrite_query(&self, key: &str) -> String;
    fn rewrite_reply(&self, reply: &str) -> String;
}

/// The only processor that ships: passes everything through.
pub struct Identity;

impl Preprocessor for Identity {
    fn rewrite_query(&self, key: &str) -> String {
        key.to_string()
    }

    fn rewrite_reply(&self, reply: &str) -> String {
        reply.to_string()
    }
}

pub fn processor_for(name: Option<&str>) -> crate::Result<Arc<dyn Preprocessor>> {
    match name {
        None | Some("identity") => Ok(Arc::new(Identity)),
        Some(other) => Err(crate::Error::UnknownProcessor(other.to_string())),
    }
}

/// Decode tcp_table `%HH` escapes. `+` is not a space in this protocol.
pub fn percent_decode(s: &str) -> Result<String, &'static str> {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%' {
            let hex = s.get(i + 1..i + 3).ok_or("truncated escape")?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err("invalid escape");
            }
            let value = u8::from_str_radix(hex, 16).map_err(|_| "invalid escape")?;
            if !value.is_ascii() {
                return Err("non-ASCII escape");
            }
            out.push(value as char);
            i += 3;
        } else if b.is_ascii() {
            out.push(b as char);
            i += 1;
        } else {
            return Err("non-ASCII request");
        }
    }
    Ok(out)
}

/// Encode a reply: anything outside the visible ASCII range, plus `%`
/// itself, becomes `%HH`.
pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b > b' ' && b < 0x7f && b != b'%' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

pub fn handle_client(
    stream: TcpStream,
    shared: SharedConfig,
    stats: StatsRegistry,
    mode: Mode,
    processor: Arc<dyn Preprocessor>,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string());
    tracing::debug!(peer = %peer, "connection opened");
    let connection = stats.start_timer();

    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(e) => {
            tracing::error!(peer = %peer, "failed to clone stream: {e}");
            return;
        }
    };
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    loop {
        line.clear();
        let started = Instant::now();
        let n = match reader
            .by_ref()
            .take(MAX_LINE as u64 + 1)
            .read_line(&mut line)
        {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(peer = %peer, "read failed: {e}");
                break;
            }
        };
        if n == 0 {
            break;
        }
        stats.record("reads", started.elapsed());
        if line.len() > MAX_LINE {
            tracing::warn!(peer = %peer, "request line too long, closing connection");
            let _ = respond(&mut writer, &stats, "400 request too long\n");
            break;
        }
        if !line.is_ascii() {
            tracing::warn!(peer = %peer, "non-ASCII request, closing connection");
            break;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        let timer = stats.start_timer();
        let response = match parts.as_slice() {
            [cmd, key] if cmd.eq_ignore_ascii_case("get") => match percent_decode(key) {
                Ok(decoded) => {
                    let query = processor.rewrite_query(&decoded);
                    let set = shared.current();
                    match resolve(&set, mode, &query) {
                        Resolved::Match { reply, .. } | Resolved::Debug { reply } => {
                            timer.stop(&stats, "success");
                            format!("200 {}\n", percent_encode(&processor.rewrite_reply(&reply)))
                        }
                        Resolved::NotFound => {
                            timer.stop(&stats, "not_found");
                            "500 not found\n".to_string()
                        }
                    }
                }
                Err(reason) => {
                    timer.stop(&stats, "bad");
                    format!("400 {reason}\n")
                }
            },
            [cmd] if cmd.eq_ignore_ascii_case("stats") => {
                timer.stop(&stats, "stats");
                stats.render_text()
            }
            [cmd] if cmd.eq_ignore_ascii_case("jstats") => {
                timer.stop(&stats, "stats");
                let mut json = stats.render_json();
                json.push('\n');
                json
            }
            [cmd, ..] if !cmd.eq_ignore_ascii_case("get") => {
                timer.stop(&stats, "bad");
                "400 unrecognized command\n".to_string()
            }
            _ => {
                timer.stop(&stats, "bad");
                "400 improperly formed request\n".to_string()
            }
        };
        if respond(&mut writer, &stats, &response).is_err() {
            break;
        }
    }

    connection.stop(&stats, "connections");
    tracing::debug!(peer = %peer, "connection closed");
}

fn respond(writer: &mut TcpStream, stats: &StatsRegistry, response: &str) -> std::io::Result<()> {
    let started = Instant::now();
    let result = writer.write_all(response.as_bytes()).and_then(|_| writer.flush());
    if let Err(e) = &result {
        tracing::debug!("write failed: {e}");
    } else {
        stats.record("writes", started.elapsed());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_basic() {
        assert_eq!(percent_decode("foo-bar").unwrap(), "foo-bar");
        assert_eq!(percent_decode("foo%2Dbar").unwrap(), "foo-bar");
        assert_eq!(percent_decode("a%20b").unwrap(), "a b");
        assert_eq!(percent_decode("a+b").unwrap(), "a+b");
    }

    #[test]
    fn decode_rejects_bad_escapes() {
        assert!(percent_decode("abc%2").is_err());
        assert!(percent_decode("abc%zz").is_err());
        assert!(percent_decode("abc%FF").is_err());
        assert!(percent_decode("caf\u{e9}").is_err());
    }

    #[test]
    fn encode_round_trips() {
        assert_eq!(percent_encode("foo"), "foo");
        assert_eq!(percent_encode("a b%c"), "a%20b%25c");
        assert_eq!(percent_decode(&percent_encode("a b%c")).unwrap(), "a b%c");
    }

    #[test]
    fn unknown_processor_is_an_error() {
        assert!(processor_for(None).is_ok());
        assert!(processor_for(Some("identity")).is_ok());
        assert!(processor_for(Some("fancy")).is_err());
    }
}
