//! VNS messages exchanged between the router and the controller.

use std::net::Ipv4Addr;

use crate::error::{ProtoError, Result};
use crate::lt::encode_frame;

pub const VHOST_LEN: usize = 32;
pub const USER_LEN: usize = 32;
pub const PASS_LEN: usize = 32;
pub const TEMPLATE_LEN: usize = 30;
pub const REASON_LEN: usize = 256;
pub const IFACE_NAME_LEN: usize = 16;
pub const HW_VALUE_LEN: usize = 32;
const HW_ENTRY_LEN: usize = 4 + HW_VALUE_LEN;
const OPEN_LEN: usize = 4 + VHOST_LEN + USER_LEN + PASS_LEN;

/// Frame type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Open = 1,
    Close = 2,
    Packet = 4,
    Banner = 8,
    HwInfo = 16,
    Rtable = 32,
    OpenTemplate = 64,
    AuthRequest = 128,
    AuthReply = 256,
    AuthStatus = 512,
}

impl TryFrom<u32> for MessageType {
    type Error = ProtoError;

    fn try_from(code: u32) -> Result<Self> {
        Ok(match code {
            1 => Self::Open,
            2 => Self::Close,
            4 => Self::Packet,
            8 => Self::Banner,
            16 => Self::HwInfo,
            32 => Self::Rtable,
            64 => Self::OpenTemplate,
            128 => Self::AuthRequest,
            256 => Self::AuthReply,
            512 => Self::AuthStatus,
            other => return Err(ProtoError::UnknownType(other)),
        })
    }
}

/// Keys of hardware info entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HwKey {
    Interface = 1,
    Speed = 2,
    Subnet = 4,
    InUse = 8,
    FixedIp = 16,
    Ether = 32,
    EthIp = 64,
    Mask = 128,
}

impl TryFrom<u32> for HwKey {
    type Error = ProtoError;

    fn try_from(code: u32) -> Result<Self> {
        Ok(match code {
            1 => Self::Interface,
            2 => Self::Speed,
            4 => Self::Subnet,
            8 => Self::InUse,
            16 => Self::FixedIp,
            32 => Self::Ether,
            64 => Self::EthIp,
            128 => Self::Mask,
            other => {
                return Err(ProtoError::Malformed {
                    kind: "hwinfo",
                    reason: format!("unknown key {other}"),
                });
            }
        })
    }
}

/// One `(key, value)` pair of a hardware info message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwEntry {
    pub key: HwKey,
    pub value: [u8; HW_VALUE_LEN],
}

impl HwEntry {
    fn with_bytes(key: HwKey, bytes: &[u8]) -> Self {
        let mut value = [0u8; HW_VALUE_LEN];
        let n = bytes.len().min(HW_VALUE_LEN);
        value[..n].copy_from_slice(&bytes[..n]);
        Self { key, value }
    }

    pub fn interface(name: &str) -> Self {
        Self::with_bytes(HwKey::Interface, name.as_bytes())
    }

    pub fn ether(mac: [u8; 6]) -> Self {
        Self::with_bytes(HwKey::Ether, &mac)
    }

    pub fn eth_ip(ip: Ipv4Addr) -> Self {
        Self::with_bytes(HwKey::EthIp, &ip.octets())
    }

    pub fn mask(mask: Ipv4Addr) -> Self {
        Self::with_bytes(HwKey::Mask, &mask.octets())
    }

    /// Value as a NUL-terminated string.
    pub fn as_str(&self) -> String {
        fixed_str(&self.value)
    }

    pub fn as_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.value[0], self.value[1], self.value[2], self.value[3])
    }

    pub fn as_mac(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.value[..6]);
        mac
    }
}

/// An interface as announced in a hardware info message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwInterface {
    pub name: String,
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
}

/// Flatten interfaces into hardware info entries.
pub fn hwinfo_entries(ifaces: &[HwInterface]) -> Vec<HwEntry> {
    let mut entries = Vec::with_capacity(ifaces.len() * 4);
    for iface in ifaces {
        entries.push(HwEntry::interface(&iface.name));
        entries.push(HwEntry::ether(iface.mac));
        entries.push(HwEntry::eth_ip(iface.ip));
        entries.push(HwEntry::mask(iface.mask));
    }
    entries
}

/// Group hardware info entries into interfaces.
///
/// An `Interface` entry opens a new interface; `Ether`, `EthIp` and `Mask`
/// entries fill in the most recent one. Entries before the first interface
/// and keys the router has no use for are skipped.
pub fn hwinfo_interfaces(entries: &[HwEntry]) -> Vec<HwInterface> {
    let mut out: Vec<HwInterface> = Vec::new();
    for entry in entries {
        if entry.key == HwKey::Interface {
            out.push(HwInterface {
                name: entry.as_str(),
                mac: [0; 6],
                ip: Ipv4Addr::UNSPECIFIED,
                mask: Ipv4Addr::UNSPECIFIED,
            });
            continue;
        }
        let Some(cur) = out.last_mut() else {
            continue;
        };
        match entry.key {
            HwKey::Ether => cur.mac = entry.as_mac(),
            HwKey::EthIp => cur.ip = entry.as_ip(),
            HwKey::Mask => cur.mask = entry.as_ip(),
            _ => {}
        }
    }
    out
}

/// A controller protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VnsMessage {
    Open {
        topo_id: u16,
        vhost: String,
        user: String,
        pass: String,
    },
    Close {
        reason: String,
    },
    Packet {
        iface: String,
        frame: Vec<u8>,
    },
    Banner {
        message: String,
    },
    HwInfo {
        entries: Vec<HwEntry>,
    },
    Rtable {
        vhost: String,
        table: String,
    },
    OpenTemplate {
        template: String,
        vhost: String,
        filters: Vec<u8>,
    },
    AuthRequest {
        salt: Vec<u8>,
    },
    AuthReply {
        user: String,
        key: Vec<u8>,
    },
    AuthStatus {
        ok: bool,
        message: String,
    },
}

impl VnsMessage {
    pub fn close(reason: impl Into<String>) -> Self {
        Self::Close {
            reason: reason.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Open { .. } => MessageType::Open,
            Self::Close { .. } => MessageType::Close,
            Self::Packet { .. } => MessageType::Packet,
            Self::Banner { .. } => MessageType::Banner,
            Self::HwInfo { .. } => MessageType::HwInfo,
            Self::Rtable { .. } => MessageType::Rtable,
            Self::OpenTemplate { .. } => MessageType::OpenTemplate,
            Self::AuthRequest { .. } => MessageType::AuthRequest,
            Self::AuthReply { .. } => MessageType::AuthReply,
            Self::AuthStatus { .. } => MessageType::AuthStatus,
        }
    }

    /// Encode the message body, without the frame header.
    pub fn encode_body(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Open {
                topo_id,
                vhost,
                user,
                pass,
            } => {
                out.extend_from_slice(&topo_id.to_be_bytes());
                out.extend_from_slice(&[0, 0]);
                put_fixed(&mut out, vhost, VHOST_LEN);
                put_fixed(&mut out, user, USER_LEN);
                put_fixed(&mut out, pass, PASS_LEN);
            }
            Self::Close { reason } => put_fixed(&mut out, reason, REASON_LEN),
            Self::Packet { iface, frame } => {
                put_fixed(&mut out, iface, IFACE_NAME_LEN);
                out.extend_from_slice(frame);
            }
            Self::Banner { message } => put_fixed(&mut out, message, REASON_LEN),
            Self::HwInfo { entries } => {
                for entry in entries {
                    out.extend_from_slice(&(entry.key as u32).to_be_bytes());
                    out.extend_from_slice(&entry.value);
                }
            }
            Self::Rtable { vhost, table } => {
                put_fixed(&mut out, vhost, VHOST_LEN);
                out.extend_from_slice(table.as_bytes());
            }
            Self::OpenTemplate {
                template,
                vhost,
                filters,
            } => {
                put_fixed(&mut out, template, TEMPLATE_LEN);
                put_fixed(&mut out, vhost, VHOST_LEN);
                out.extend_from_slice(filters);
            }
            Self::AuthRequest { salt } => out.extend_from_slice(salt),
            Self::AuthReply { user, key } => {
                out.extend_from_slice(&(user.len() as u32).to_be_bytes());
                out.extend_from_slice(user.as_bytes());
                out.extend_from_slice(key);
            }
            Self::AuthStatus { ok, message } => {
                out.push(u8::from(*ok));
                out.extend_from_slice(message.as_bytes());
            }
        }
        out
    }

    /// Encode the message as a complete length-type frame.
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(self.message_type() as u32, &self.encode_body())
    }

    /// Decode a message body of frame type `ty`.
    pub fn decode(ty: u32, body: &[u8]) -> Result<Self> {
        let msg = match MessageType::try_from(ty)? {
            MessageType::Open => {
                need("open", body, OPEN_LEN)?;
                let topo_id = u16::from_be_bytes([body[0], body[1]]);
                let mut off = 4;
                let vhost = fixed_str(&body[off..off + VHOST_LEN]);
                off += VHOST_LEN;
                let user = fixed_str(&body[off..off + USER_LEN]);
                off += USER_LEN;
                let pass = fixed_str(&body[off..off + PASS_LEN]);
                Self::Open {
                    topo_id,
                    vhost,
                    user,
                    pass,
                }
            }
            MessageType::Close => Self::Close {
                reason: fixed_str(body),
            },
            MessageType::Packet => {
                need("packet", body, IFACE_NAME_LEN)?;
                Self::Packet {
                    iface: fixed_str(&body[..IFACE_NAME_LEN]),
                    frame: body[IFACE_NAME_LEN..].to_vec(),
                }
            }
            MessageType::Banner => Self::Banner {
                message: fixed_str(body),
            },
            MessageType::HwInfo => {
                if body.len() % HW_ENTRY_LEN != 0 {
                    return Err(ProtoError::Malformed {
                        kind: "hwinfo",
                        reason: format!(
                            "body of {} bytes is not a whole number of entries",
                            body.len()
                        ),
                    });
                }
                let entries = body
                    .chunks_exact(HW_ENTRY_LEN)
                    .map(|chunk| {
                        let key = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                        let mut value = [0u8; HW_VALUE_LEN];
                        value.copy_from_slice(&chunk[4..]);
                        Ok(HwEntry {
                            key: HwKey::try_from(key)?,
                            value,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Self::HwInfo { entries }
            }
            MessageType::Rtable => {
                need("rtable", body, VHOST_LEN)?;
                Self::Rtable {
                    vhost: fixed_str(&body[..VHOST_LEN]),
                    table: String::from_utf8_lossy(&body[VHOST_LEN..]).into_owned(),
                }
            }
            MessageType::OpenTemplate => {
                need("open template", body, TEMPLATE_LEN + VHOST_LEN)?;
                Self::OpenTemplate {
                    template: fixed_str(&body[..TEMPLATE_LEN]),
                    vhost: fixed_str(&body[TEMPLATE_LEN..TEMPLATE_LEN + VHOST_LEN]),
                    filters: body[TEMPLATE_LEN + VHOST_LEN..].to_vec(),
                }
            }
            MessageType::AuthRequest => Self::AuthRequest {
                salt: body.to_vec(),
            },
            MessageType::AuthReply => {
                need("auth reply", body, 4)?;
                let user_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
                need("auth reply", body, 4 + user_len)?;
                Self::AuthReply {
                    user: String::from_utf8_lossy(&body[4..4 + user_len]).into_owned(),
                    key: body[4 + user_len..].to_vec(),
                }
            }
            MessageType::AuthStatus => {
                need("auth status", body, 1)?;
                Self::AuthStatus {
                    ok: body[0] != 0,
                    message: String::from_utf8_lossy(&body[1..]).into_owned(),
                }
            }
        };
        Ok(msg)
    }
}

fn need(kind: &'static str, body: &[u8], need: usize) -> Result<()> {
    if body.len() < need {
        return Err(ProtoError::Truncated {
            kind,
            need,
            got: body.len(),
        });
    }
    Ok(())
}

/// Append `s` as a NUL-padded field of exactly `width` bytes.
fn put_fixed(out: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (width - n), 0);
}

fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
