//! Typed control messages and their argument signatures
//!
//! | Address         | Arguments                                              |
//! |-----------------|--------------------------------------------------------|
//! | `create`        | id:int type:string resource:string                     |
//! | `create_ex`     | id type resource x:float y:float amplitude:float flags… |
//! | `destroy`       | id:int                                                 |
//! | `update`        | id:int param:string value:float\|int (id 0 = engine)   |
//! | `loadPreset`    | id:int blob:string                                     |
//! | `reload`        | id:int resource:string                                 |
//! | `debugDump`     |                                                        |
//! | `play` `pause` `stop` |                                                  |
//! | `setLooping`    | on:int                                                 |
//! | `setRange`      | start:int end:int                                      |
//! | `seek`          | frames:int                                             |
//! | `setMasterGain` | gain:float                                             |
//! | `setDevice`     | name:string                                            |
//! | `setBufferSize` | frames:int                                             |
//!
//! Ints are accepted where floats are expected; nothing else is coerced.

use mesh_engine::error::ProtocolError;
use mesh_engine::types::{Frames, ParamName, ParamValue, Target, UnitId};
use mesh_engine::unit::Placement;

use crate::parse::{Arg, RawMessage};

/// Argument type in a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    /// Float, or an int promoted to float
    Float,
    /// Float or int, kept as given
    Number,
    Str,
    /// Any number of trailing strings
    RestStr,
}

impl ArgKind {
    fn name(self) -> &'static str {
        match self {
            ArgKind::Int => "int",
            ArgKind::Float => "float",
            ArgKind::Number => "float|int",
            ArgKind::Str => "string",
            ArgKind::RestStr => "string...",
        }
    }

    fn accepts(self, arg: &Arg) -> bool {
        matches!(
            (self, arg),
            (ArgKind::Int, Arg::Int(_))
                | (ArgKind::Float | ArgKind::Number, Arg::Int(_) | Arg::Float(_))
                | (ArgKind::Str | ArgKind::RestStr, Arg::Str(_))
        )
    }
}

/// Address plus expected argument kinds
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub address: &'static str,
    pub args: &'static [ArgKind],
}

impl Signature {
    /// Human-readable form, e.g. `destroy(int)`
    pub fn describe(&self) -> String {
        let args: Vec<&str> = self.args.iter().map(|kind| kind.name()).collect();
        format!("{}({})", self.address, args.join(", "))
    }

    /// Check argument count and types
    pub fn check(&self, args: &[Arg]) -> Result<(), ProtocolError> {
        let mismatch = || ProtocolError::ArgumentMismatch {
            address: self.address.to_string(),
            expected: self.describe(),
        };

        let rest = self.args.last() == Some(&ArgKind::RestStr);
        let fixed = if rest { self.args.len() - 1 } else { self.args.len() };
        if args.len() < fixed || (!rest && args.len() > fixed) {
            return Err(mismatch());
        }
        for (index, arg) in args.iter().enumerate() {
            let kind = self.args[index.min(self.args.len() - 1)];
            if !kind.accepts(arg) {
                return Err(mismatch());
            }
        }
        Ok(())
    }
}

use ArgKind::*;

/// Every address the control surface understands
pub static SIGNATURES: &[Signature] = &[
    Signature { address: "create", args: &[Int, Str, Str] },
    Signature { address: "create_ex", args: &[Int, Str, Str, Float, Float, Float, RestStr] },
    Signature { address: "destroy", args: &[Int] },
    Signature { address: "update", args: &[Int, Str, Number] },
    Signature { address: "loadPreset", args: &[Int, Str] },
    Signature { address: "reload", args: &[Int, Str] },
    Signature { address: "debugDump", args: &[] },
    Signature { address: "play", args: &[] },
    Signature { address: "pause", args: &[] },
    Signature { address: "stop", args: &[] },
    Signature { address: "setLooping", args: &[Int] },
    Signature { address: "setRange", args: &[Int, Int] },
    Signature { address: "seek", args: &[Int] },
    Signature { address: "setMasterGain", args: &[Float] },
    Signature { address: "setDevice", args: &[Str] },
    Signature { address: "setBufferSize", args: &[Int] },
];

/// Look up the signature for an address
pub fn signature(address: &str) -> Option<&'static Signature> {
    SIGNATURES.iter().find(|sig| sig.address == address)
}

/// A validated control message
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Create {
        id: UnitId,
        unit_type: String,
        resource: Option<String>,
        placement: Option<Placement>,
        flags: Vec<String>,
    },
    Destroy { id: UnitId },
    Update {
        target: Target,
        param: ParamName,
        value: ParamValue,
    },
    LoadPreset { id: UnitId, blob: String },
    Reload { id: UnitId, resource: String },
    DebugDump,
    Play,
    Pause,
    Stop,
    SetLooping(bool),
    SetRange { start: Frames, end: Frames },
    Seek(Frames),
    SetMasterGain(f32),
    SetDevice(String),
    SetBufferSize(u32),
}

impl ControlMessage {
    /// Validate a raw message against its signature and convert it
    pub fn from_raw(raw: RawMessage) -> Result<Self, ProtocolError> {
        let sig = signature(&raw.address)
            .ok_or_else(|| ProtocolError::UnknownAddress(raw.address.clone()))?;
        sig.check(&raw.args)?;

        let mut args = raw.args.into_iter();
        let message = match sig.address {
            "create" | "create_ex" => {
                let id = unit_id(next_int(&mut args))?;
                let unit_type = next_str(&mut args);
                let resource = Some(next_str(&mut args)).filter(|path| !path.is_empty());
                let placement = if sig.address == "create_ex" {
                    Some(Placement {
                        x: next_float(&mut args) as f32,
                        y: next_float(&mut args) as f32,
                        amplitude: next_float(&mut args) as f32,
                    })
                } else {
                    None
                };
                ControlMessage::Create {
                    id,
                    unit_type,
                    resource,
                    placement,
                    flags: args.map(into_str).collect(),
                }
            }
            "destroy" => ControlMessage::Destroy {
                id: unit_id(next_int(&mut args))?,
            },
            "update" => {
                let raw_id = next_int(&mut args);
                if raw_id < 0 || raw_id > u32::MAX as i64 {
                    return Err(ProtocolError::InvalidUnitId(raw_id));
                }
                let name = next_str(&mut args);
                let param = ParamName::new(&name).ok_or(ProtocolError::InvalidParamName(name))?;
                let value = match args.next() {
                    Some(Arg::Int(v)) => ParamValue::Int(v),
                    Some(Arg::Float(v)) => ParamValue::Float(v),
                    _ => return Err(ProtocolError::Malformed("update value".to_string())),
                };
                ControlMessage::Update {
                    target: Target::from_raw(raw_id as u32),
                    param,
                    value,
                }
            }
            "loadPreset" => ControlMessage::LoadPreset {
                id: unit_id(next_int(&mut args))?,
                blob: next_str(&mut args),
            },
            "reload" => ControlMessage::Reload {
                id: unit_id(next_int(&mut args))?,
                resource: next_str(&mut args),
            },
            "debugDump" => ControlMessage::DebugDump,
            "play" => ControlMessage::Play,
            "pause" => ControlMessage::Pause,
            "stop" => ControlMessage::Stop,
            "setLooping" => ControlMessage::SetLooping(next_int(&mut args) != 0),
            "setRange" => {
                let start = next_int(&mut args);
                let end = next_int(&mut args);
                if end <= start || start < 0 {
                    return Err(ProtocolError::InvalidRange { start, end });
                }
                ControlMessage::SetRange { start, end }
            }
            "seek" => ControlMessage::Seek(next_int(&mut args)),
            "setMasterGain" => ControlMessage::SetMasterGain(next_float(&mut args) as f32),
            "setDevice" => ControlMessage::SetDevice(next_str(&mut args)),
            "setBufferSize" => {
                let frames = next_int(&mut args);
                let frames = u32::try_from(frames).map_err(|_| ProtocolError::ArgumentMismatch {
                    address: sig.address.to_string(),
                    expected: "a positive frame count".to_string(),
                })?;
                ControlMessage::SetBufferSize(frames)
            }
            other => return Err(ProtocolError::UnknownAddress(other.to_string())),
        };
        Ok(message)
    }
}

/// Unit ids are non-zero and fit in 32 bits
fn unit_id(raw: i64) -> Result<UnitId, ProtocolError> {
    u32::try_from(raw)
        .ok()
        .and_then(UnitId::new)
        .ok_or(ProtocolError::InvalidUnitId(raw))
}

// Signature checks ran first, so these only see the expected kinds

fn next_int(args: &mut impl Iterator<Item = Arg>) -> i64 {
    match args.next() {
        Some(Arg::Int(v)) => v,
        _ => 0,
    }
}

fn next_float(args: &mut impl Iterator<Item = Arg>) -> f64 {
    match args.next() {
        Some(Arg::Float(v)) => v,
        Some(Arg::Int(v)) => v as f64,
        _ => 0.0,
    }
}

fn next_str(args: &mut impl Iterator<Item = Arg>) -> String {
    args.next().map(into_str).unwrap_or_default()
}

fn into_str(arg: Arg) -> String {
    match arg {
        Arg::Str(s) => s,
        Arg::Int(v) => v.to_string(),
        Arg::Float(v) => v.to_string(),
    }
}
