use crate::address::GroupAddress;
use crate::cgate::event::parse_event_line;
use crate::cgate::event::GroupUpdate;
use tracing::debug;
use tracing::error;
use tracing::warn;

/// A classified command-port response the bridge acts on.
///
/// Success acknowledgements (200) and protocol errors are consumed here and
/// only logged; everything the orchestrator must react to comes out as one
/// of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResponse {
    /// A `300` object status reporting a group level.
    LevelUpdate { addr: GroupAddress, raw: u8 },

    /// A `300-` event relayed inline on the command port.
    GroupEvent(GroupUpdate),

    /// A complete TREEXML document, emitted on the terminating `344`.
    TreeComplete { network: String, xml: String },
}

/// Accumulates the `343`/`347`/`344` framed TREEXML reply.
///
/// `parts` is non-empty only while `network` is set; both are cleared
/// together when the document completes or a new `343` arrives.
#[derive(Debug, Default)]
struct TreeXmlAccumulator {
    network: Option<String>,
    parts: Vec<String>,
}

impl TreeXmlAccumulator {
    fn begin(&mut self, network: &str) {
        if self.network.is_some() {
            warn!("TREEXML restarted for network {network}, dropping the partial document");
        }
        self.network = Some(network.to_string());
        self.parts.clear();
    }

    fn push(&mut self, chunk: &str) {
        if self.network.is_some() {
            self.parts.push(chunk.to_string());
        } else {
            debug!("Ignoring TREEXML data outside a document");
        }
    }

    fn end(&mut self, network: &str) -> Option<(String, String)> {
        match &self.network {
            None => {
                warn!("TREEXML end for network {network} without a matching start");
                None
            }
            Some(started) if started != network => {
                warn!(
                    "TREEXML end for network {network} does not match the started network {started}"
                );
                None
            }
            Some(_) => {
                let network = self.network.take().unwrap_or_default();
                let xml = std::mem::take(&mut self.parts).join("");
                Some((network, xml))
            }
        }
    }
}

/// Classifies C-Gate command-port lines.
#[derive(Debug, Default)]
pub struct CommandResponseProcessor {
    tree: TreeXmlAccumulator,
}

impl CommandResponseProcessor {
    pub fn new() -> CommandResponseProcessor {
        CommandResponseProcessor::default()
    }

    /// Process one command-port line. Most lines are consumed silently.
    pub fn process_line(&mut self, line: &str) -> Option<CommandResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((code, payload)) = split_response(line) else {
            warn!("Unparsable command response: {line:?}");
            return None;
        };

        match code {
            200 => {
                debug!("C-Gate acknowledged: {payload}");
                None
            }
            343 => {
                self.tree.begin(payload.trim());
                None
            }
            347 => {
                self.tree.push(payload);
                None
            }
            344 => self
                .tree
                .end(payload.trim())
                .map(|(network, xml)| CommandResponse::TreeComplete { network, xml }),
            300 => parse_object_status(payload),
            code if code >= 400 => {
                error!("C-Gate error {code}: {payload} ({})", error_hint(code));
                None
            }
            code => {
                debug!("Ignoring C-Gate response {code}: {payload}");
                None
            }
        }
    }
}

/// Split `NNN payload` / `NNN-payload` into the code and its payload.
fn split_response(line: &str) -> Option<(u16, &str)> {
    if line.len() < 3 || !line.is_char_boundary(3) {
        return None;
    }
    let (digits, rest) = line.split_at(3);
    let code = digits.parse().ok()?;

    match rest.as_bytes().first() {
        None => Some((code, "")),
        Some(b' ') | Some(b'-') => Some((code, &rest[1..])),
        Some(_) => None,
    }
}

/// A `300` line is either an object status (`//PROJECT/N/A/G: level=X`) or
/// an inline event in the event-port syntax.
fn parse_object_status(payload: &str) -> Option<CommandResponse> {
    if let Some((addr, raw)) = parse_level_status(payload) {
        return Some(CommandResponse::LevelUpdate { addr, raw });
    }
    match parse_event_line(payload) {
        Ok(Some(update)) => Some(CommandResponse::GroupEvent(update)),
        Ok(None) => None,
        Err(err) => {
            warn!("Unparsable object status {payload:?}: {err}");
            None
        }
    }
}

fn parse_level_status(payload: &str) -> Option<(GroupAddress, u8)> {
    let mut tokens = payload.split_whitespace();
    let path = tokens.next()?;
    let addr = parse_object_path(path)?;
    let level = tokens.find_map(|token| token.strip_prefix("level="))?;
    let raw = level.parse().ok()?;
    Some((addr, raw))
}

/// Parse `//PROJECT/N/A/G` (with an optional trailing `:`).
fn parse_object_path(path: &str) -> Option<GroupAddress> {
    let path = path.strip_prefix("//")?.trim_end_matches(':');
    match path.split('/').collect::<Vec<_>>()[..] {
        [_project, network, application, group] => {
            GroupAddress::new(network, application, group).ok()
        }
        _ => None,
    }
}

fn error_hint(code: u16) -> &'static str {
    match code {
        400 => "bad syntax in the command sent to C-Gate",
        401 => "unauthorized, check the C-Gate access control settings",
        404 => "no such object, check the project name and the address",
        406 => "the addressed object does not support this command",
        500 => "internal C-Gate failure",
        503 => "C-Gate is overloaded and dropped the command",
        _ => "see the C-Gate serial interface guide",
    }
}
