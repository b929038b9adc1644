//! Unit factory registry
//!
//! Maps a type name to a factory function. Factories run on the producer
//! thread (they may allocate freely); the resulting unit travels to the
//! processing thread inside a `Create` command.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{DelayUnit, PlayerUnit, StepperUnit, ToneUnit, Unit};
use crate::engine::Command;
use crate::error::ProtocolError;
use crate::types::{ParamName, ParamValue, UnitId, SAMPLE_RATE};

/// Builds a unit from a creation spec
pub type UnitFactory = fn(&UnitSpec) -> Box<dyn Unit>;

/// Spatial placement given by `create_ex`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub amplitude: f32,
}

/// Everything a factory gets to build a unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    /// Backing media, loaded asynchronously once the unit is live
    pub resource: Option<PathBuf>,
    pub placement: Option<Placement>,
    /// `name` (sets the parameter to 1) or `name=value`
    pub flags: Vec<String>,
    pub sample_rate: u32,
}

impl Default for UnitSpec {
    fn default() -> Self {
        Self {
            resource: None,
            placement: None,
            flags: Vec::new(),
            sample_rate: SAMPLE_RATE,
        }
    }
}

impl UnitSpec {
    pub fn with_resource(mut self, path: impl Into<PathBuf>) -> Self {
        self.resource = Some(path.into());
        self
    }
}

/// Registered unit types
#[derive(Clone)]
pub struct UnitRegistry {
    factories: BTreeMap<&'static str, UnitFactory>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl UnitRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `player`, `stepper`, `tone` and `delay` types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(PlayerUnit::TYPE, PlayerUnit::boxed);
        registry.register(StepperUnit::TYPE, StepperUnit::boxed);
        registry.register(ToneUnit::TYPE, ToneUnit::boxed);
        registry.register(DelayUnit::TYPE, DelayUnit::boxed);
        registry
    }

    /// Register (or replace) a unit type
    pub fn register(&mut self, type_name: &'static str, factory: UnitFactory) {
        if self.factories.insert(type_name, factory).is_some() {
            log::warn!("Unit type {:?} registered twice, replacing", type_name);
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Construct a unit and apply placement and flags
    pub fn build(&self, type_name: &str, spec: &UnitSpec) -> Result<Box<dyn Unit>, ProtocolError> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| ProtocolError::UnknownUnitType(type_name.to_string()))?;
        let mut unit = factory(spec);

        if let Some(placement) = spec.placement {
            for (name, value) in [
                ("x", placement.x),
                ("y", placement.y),
                ("amplitude", placement.amplitude),
            ] {
                set_named(unit.as_mut(), name, ParamValue::Float(value as f64));
            }
        }

        for flag in &spec.flags {
            let (name, value) = match flag.split_once('=') {
                Some((name, value)) => match value.trim().parse::<f64>() {
                    Ok(v) => (name.trim(), v),
                    Err(_) => {
                        log::warn!("Ignoring flag {:?} on {}: value is not a number", flag, type_name);
                        continue;
                    }
                },
                None => (flag.trim(), 1.0),
            };
            if !set_named(unit.as_mut(), name, ParamValue::Float(value)) {
                log::warn!("Ignoring unknown flag {:?} on {}", flag, type_name);
            }
        }

        Ok(unit)
    }

    /// Build a unit and wrap it in a `Create` command
    pub fn create_command(
        &self,
        id: UnitId,
        type_name: &str,
        spec: &UnitSpec,
    ) -> Result<Command, ProtocolError> {
        Ok(Command::create(id, self.build(type_name, spec)?))
    }
}

fn set_named(unit: &mut dyn Unit, name: &str, value: ParamValue) -> bool {
    match ParamName::new(name) {
        Some(param) => unit.handle_param(&param, value),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = UnitRegistry::with_builtins();
        let types: Vec<_> = registry.types().collect();
        assert_eq!(types, vec!["delay", "player", "stepper", "tone"]);
    }

    #[test]
    fn test_unknown_type_is_protocol_error() {
        let registry = UnitRegistry::with_builtins();
        assert!(matches!(
            registry.build("theremin", &UnitSpec::default()),
            Err(ProtocolError::UnknownUnitType(_))
        ));
    }

    #[test]
    fn test_placement_and_flags_become_params() {
        let registry = UnitRegistry::with_builtins();
        let spec = UnitSpec {
            placement: Some(Placement {
                x: -0.5,
                y: 0.25,
                amplitude: 0.8,
            }),
            flags: vec!["sync".into(), "gain=0.3".into(), "warp".into()],
            ..Default::default()
        };
        let unit = registry.build("player", &spec).unwrap();
        let params = unit.params();
        let value = |name: &str| {
            let index = params.index_of(name).unwrap();
            params.get(index)
        };

        assert_eq!(value("x"), -0.5);
        assert_eq!(value("y"), 0.25);
        assert!((value("amplitude") - 0.8).abs() < 1e-6);
        assert_eq!(value("sync"), 1.0);
        assert!((value("gain") - 0.3).abs() < 1e-12);
    }
}
