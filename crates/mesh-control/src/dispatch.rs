//! Control message to engine command translation
//!
//! A [`Dispatcher`] belongs to one producer thread. Heavy work (building
//! units, parsing presets) happens here, so the processing thread only
//! receives ready-made values.

use std::path::PathBuf;

use mesh_engine::engine::{Command, CommandSender, EngineSetting, TransportCommand};
use mesh_engine::error::ProtocolError;
use mesh_engine::preset::PresetTree;
use mesh_engine::unit::{UnitRegistry, UnitSpec};

use crate::messages::ControlMessage;
use crate::parse::parse_line;
use crate::ControlError;

/// Accepted/rejected line counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Parses control lines and enqueues the resulting commands
pub struct Dispatcher {
    registry: UnitRegistry,
    sender: CommandSender,
    sample_rate: u32,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(registry: UnitRegistry, sender: CommandSender, sample_rate: u32) -> Self {
        Self {
            registry,
            sender,
            sample_rate,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Handle one control line
    ///
    /// Returns `Ok(false)` for blank and comment lines. Rejections are
    /// counted and returned; the caller decides how loudly to log them.
    pub fn handle_line(&mut self, line: &str) -> Result<bool, ControlError> {
        let result = self.try_line(line);
        match &result {
            Ok(true) => self.stats.accepted += 1,
            Ok(false) => {}
            Err(_) => self.stats.rejected += 1,
        }
        result
    }

    fn try_line(&mut self, line: &str) -> Result<bool, ControlError> {
        let Some(raw) = parse_line(line)? else {
            return Ok(false);
        };
        let message = ControlMessage::from_raw(raw)?;
        self.dispatch(message)?;
        Ok(true)
    }

    /// Enqueue a validated message
    ///
    /// Parameter updates go through the coalescing lane, everything else
    /// through the ordered lane.
    pub fn dispatch(&mut self, message: ControlMessage) -> Result<(), ControlError> {
        log::debug!("[CONTROL] {:?}", message);
        if let ControlMessage::Update {
            target,
            param,
            value,
        } = message
        {
            self.sender.enqueue_latest(target, param, value)?;
            return Ok(());
        }
        let command = self.command(message)?;
        self.sender.enqueue(command)?;
        Ok(())
    }

    /// Build the engine command for a message
    pub fn command(&self, message: ControlMessage) -> Result<Command, ProtocolError> {
        let command = match message {
            ControlMessage::Create {
                id,
                unit_type,
                resource,
                placement,
                flags,
            } => {
                let spec = UnitSpec {
                    resource: resource.map(PathBuf::from),
                    placement,
                    flags,
                    sample_rate: self.sample_rate,
                };
                self.registry.create_command(id, &unit_type, &spec)?
            }
            ControlMessage::Destroy { id } => Command::Destroy { id },
            ControlMessage::Update {
                target,
                param,
                value,
            } => Command::Update {
                target,
                param,
                value,
            },
            ControlMessage::LoadPreset { id, blob } => {
                let preset = PresetTree::parse(&blob)
                    .map_err(|err| ProtocolError::InvalidPreset(err.to_string()))?;
                Command::load_preset(id, preset)
            }
            ControlMessage::Reload { id, resource } => Command::reload(id, resource),
            ControlMessage::DebugDump => Command::DebugDump,
            ControlMessage::Play => Command::Transport(TransportCommand::Play),
            ControlMessage::Pause => Command::Transport(TransportCommand::Pause),
            ControlMessage::Stop => Command::Transport(TransportCommand::Stop),
            ControlMessage::SetLooping(on) => Command::Transport(TransportCommand::SetLooping(on)),
            ControlMessage::SetRange { start, end } => {
                Command::Transport(TransportCommand::SetRange { start, end })
            }
            ControlMessage::Seek(frames) => Command::Transport(TransportCommand::Seek(frames)),
            ControlMessage::SetMasterGain(gain) => {
                Command::Engine(EngineSetting::MasterGain(gain))
            }
            ControlMessage::SetDevice(name) => Command::set_device(name),
            ControlMessage::SetBufferSize(frames) => {
                Command::Engine(EngineSetting::BufferSize(frames))
            }
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_engine::engine::{command_channel, ChannelConfig, CommandKind, CommandReceiver};
    use mesh_engine::error::EnqueueError;
    use mesh_engine::types::{ParamValue, Target};

    fn rig(capacity: usize) -> (Dispatcher, CommandReceiver) {
        let (hub, receiver) = command_channel(ChannelConfig {
            capacity,
            max_per_drain: 64,
            coalesce_slots: 8,
            max_producers: 2,
        });
        let sender = hub.sender().unwrap();
        let dispatcher = Dispatcher::new(UnitRegistry::with_builtins(), sender, 48000);
        (dispatcher, receiver)
    }

    fn kinds(receiver: &mut CommandReceiver) -> Vec<CommandKind> {
        receiver.drain().map(|env| env.command.kind()).collect()
    }

    #[test]
    fn test_lines_become_commands_in_order() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (mut dispatcher, mut receiver) = rig(16);

        for line in [
            "create 1 tone \"\"",
            "# comment",
            "",
            "/setRange 0 96000",
            "play",
            "destroy 1",
            "debugDump",
        ] {
            dispatcher.handle_line(line).unwrap();
        }

        assert_eq!(
            kinds(&mut receiver),
            vec![
                CommandKind::Create,
                CommandKind::Transport,
                CommandKind::Transport,
                CommandKind::Destroy,
                CommandKind::DebugDump,
            ]
        );
        assert_eq!(dispatcher.stats().accepted, 5);
    }

    #[test]
    fn test_updates_coalesce_to_latest() {
        let (mut dispatcher, mut receiver) = rig(16);
        dispatcher.handle_line("update 4 gain 0.1").unwrap();
        dispatcher.handle_line("update 4 gain 0.2").unwrap();
        dispatcher.handle_line("update 4 gain 0.7").unwrap();

        let updates: Vec<_> = receiver
            .drain()
            .filter_map(|env| match env.command {
                Command::Update { target, value, .. } => Some((target, value)),
                _ => None,
            })
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1, ParamValue::Float(0.7));
        assert!(matches!(updates[0].0, Target::Unit(id) if id.get() == 4));
    }

    #[test]
    fn test_rejections_are_counted_and_not_enqueued() {
        let (mut dispatcher, mut receiver) = rig(16);
        assert!(matches!(
            dispatcher.handle_line("create 2 theremin x.wav"),
            Err(ControlError::Protocol(ProtocolError::UnknownUnitType(_)))
        ));
        assert!(matches!(
            dispatcher.handle_line("loadPreset 2 \"[not: yaml\""),
            Err(ControlError::Protocol(ProtocolError::InvalidPreset(_)))
        ));
        assert!(dispatcher.handle_line("destroy 0").is_err());

        assert!(kinds(&mut receiver).is_empty());
        assert_eq!(dispatcher.stats().rejected, 3);
    }

    #[test]
    fn test_preset_parsed_on_producer_side() {
        let (mut dispatcher, mut receiver) = rig(16);
        dispatcher
            .handle_line(r#"loadPreset 3 "type: tone\nparams:\n  freq: 220""#)
            .unwrap();
        let commands: Vec<_> = receiver.drain().map(|env| env.command).collect();
        match &commands[..] {
            [Command::LoadPreset { id, preset }] => {
                assert_eq!(id.get(), 3);
                assert_eq!(preset.unit_type.as_deref(), Some("tone"));
                assert_eq!(preset.params.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_full_lane_reports_backpressure() {
        let (mut dispatcher, _receiver) = rig(2);
        dispatcher.handle_line("play").unwrap();
        dispatcher.handle_line("pause").unwrap();
        let err = dispatcher.handle_line("stop").unwrap_err();
        assert!(matches!(err, ControlError::Enqueue(EnqueueError::Full(_))));
        assert!(err.is_backpressure());
    }
}
