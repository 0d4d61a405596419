//! Wire messages and the line codec.
//!
//! Each message is one `\n`-terminated line of `;`-separated `key=value`
//! pairs. `Message` is a tagged sum type, one arm per wire `type`, each
//! carrying exactly its required fields, rather than a single struct with
//! fields that are meaningful for some message types and ignored for
//! others.

use std::collections::HashMap;
use std::fmt;

use crate::error::DecodeError;
use crate::identity::MemberId;
use crate::proposal::ProposalNumber;

pub type Value = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Propose {
        from: String,
        v: Value,
    },
    Prepare {
        from: MemberId,
        n: ProposalNumber,
    },
    Promise {
        from: MemberId,
        n: ProposalNumber,
        prior: Option<(ProposalNumber, Value)>,
    },
    Reject {
        from: MemberId,
        higher_n: ProposalNumber,
    },
    AcceptRequest {
        from: MemberId,
        n: ProposalNumber,
        v: Value,
    },
    Accepted {
        from: MemberId,
        n: ProposalNumber,
        v: Value,
    },
    Decide {
        from: String,
        v: Value,
    },
}

impl Message {
    fn type_tag(&self) -> &'static str {
        match self {
            Message::Propose { .. } => "PROPOSE",
            Message::Prepare { .. } => "PREPARE",
            Message::Promise { .. } => "PROMISE",
            Message::Reject { .. } => "REJECT",
            Message::AcceptRequest { .. } => "ACCEPT_REQUEST",
            Message::Accepted { .. } => "ACCEPTED",
            Message::Decide { .. } => "DECIDE",
        }
    }

    /// The sender id carried by every message, as the raw wire string
    /// (`from` may be `"script"` for externally-injected PROPOSE messages).
    pub fn from_raw(&self) -> &str {
        match self {
            Message::Propose { from, .. } => from,
            Message::Prepare { from, .. } => from.as_str(),
            Message::Promise { from, .. } => from.as_str(),
            Message::Reject { from, .. } => from.as_str(),
            Message::AcceptRequest { from, .. } => from.as_str(),
            Message::Accepted { from, .. } => from.as_str(),
            Message::Decide { from, .. } => from,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode(self))
    }
}

/// Encodes a message into the `key=value;...` line, without a trailing
/// newline (the transport appends it).
pub fn encode(m: &Message) -> String {
    let mut pairs: Vec<(String, String)> = Vec::new();
    pairs.push(("type".into(), m.type_tag().into()));
    pairs.push(("from".into(), m.from_raw().into()));

    match m {
        Message::Propose { v, .. } => {
            pairs.push(("v".into(), v.clone()));
        }
        Message::Prepare { n, .. } => {
            push_n(&mut pairs, *n);
        }
        Message::Promise { n, prior, .. } => {
            push_n(&mut pairs, *n);
            if let Some((accepted_n, accepted_v)) = prior {
                pairs.push(("acceptedN".into(), accepted_n.to_string()));
                pairs.push(("acceptedV".into(), accepted_v.clone()));
            }
        }
        Message::Reject { higher_n, .. } => {
            pairs.push(("higherN".into(), higher_n.to_string()));
        }
        Message::AcceptRequest { n, v, .. } => {
            push_n(&mut pairs, *n);
            pairs.push(("v".into(), v.clone()));
        }
        Message::Accepted { n, v, .. } => {
            push_n(&mut pairs, *n);
            pairs.push(("v".into(), v.clone()));
        }
        Message::Decide { v, .. } => {
            pairs.push(("v".into(), v.clone()));
        }
    }

    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn push_n(pairs: &mut Vec<(String, String)>, n: ProposalNumber) {
    if n.value() >= 0 {
        pairs.push(("n".into(), n.to_string()));
    }
}

/// Parses one line (without its trailing newline) into a [`Message`].
pub fn decode(line: &str) -> Result<Message, DecodeError> {
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for pair in line.split(';').filter(|s| !s.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().ok_or_else(|| DecodeError::MalformedPair(pair.to_string()))?;
        let value = parts
            .next()
            .ok_or_else(|| DecodeError::MalformedPair(pair.to_string()))?;
        fields.insert(key, value);
    }

    let ty = *fields.get("type").ok_or(DecodeError::MissingField("type"))?;
    let from_raw = *fields.get("from").ok_or(DecodeError::MissingField("from"))?;

    match ty {
        "PROPOSE" => Ok(Message::Propose {
            from: from_raw.to_string(),
            v: require_value(&fields)?,
        }),
        "DECIDE" => Ok(Message::Decide {
            from: from_raw.to_string(),
            v: require_value(&fields)?,
        }),
        "PREPARE" => Ok(Message::Prepare {
            from: require_member(from_raw)?,
            n: require_n(&fields)?,
        }),
        "PROMISE" => {
            let accepted_n = fields.get("acceptedN");
            let accepted_v = fields.get("acceptedV");
            let prior = match (accepted_n, accepted_v) {
                (Some(n), Some(v)) => Some((parse_n("acceptedN", n)?, (*v).to_string())),
                (None, None) => None,
                _ => None,
            };
            Ok(Message::Promise {
                from: require_member(from_raw)?,
                n: require_n(&fields)?,
                prior,
            })
        }
        "REJECT" => {
            let higher_n = *fields.get("higherN").ok_or(DecodeError::MissingField("higherN"))?;
            Ok(Message::Reject {
                from: require_member(from_raw)?,
                higher_n: parse_n("higherN", higher_n)?,
            })
        }
        "ACCEPT_REQUEST" => Ok(Message::AcceptRequest {
            from: require_member(from_raw)?,
            n: require_n(&fields)?,
            v: require_value(&fields)?,
        }),
        "ACCEPTED" => Ok(Message::Accepted {
            from: require_member(from_raw)?,
            n: require_n(&fields)?,
            v: require_value(&fields)?,
        }),
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

fn require_value(fields: &HashMap<&str, &str>) -> Result<Value, DecodeError> {
    let v = *fields.get("v").ok_or(DecodeError::MissingField("v"))?;
    if v.is_empty() {
        return Err(DecodeError::EmptyValue);
    }
    Ok(v.to_string())
}

fn require_n(fields: &HashMap<&str, &str>) -> Result<ProposalNumber, DecodeError> {
    let n = *fields.get("n").ok_or(DecodeError::MissingField("n"))?;
    parse_n("n", n)
}

fn parse_n(field: &'static str, raw: &str) -> Result<ProposalNumber, DecodeError> {
    raw.parse::<i64>()
        .map(ProposalNumber)
        .map_err(|_| DecodeError::InvalidInt { field, value: raw.to_string() })
}

fn require_member(raw: &str) -> Result<MemberId, DecodeError> {
    MemberId::parse(raw).map_err(|_| DecodeError::InvalidMember { field: "from", value: raw.to_string() })
}
