//! Playback units ("voices")
//!
//! A unit is a single playback entity owned by the engine. Every unit type
//! implements the same capability interface:
//!
//! | Phase          | Method                          | Thread       |
//! |----------------|---------------------------------|--------------|
//! | construction   | registry factory                | producer     |
//! | prepare        | [`Unit::prepare`]               | processing   |
//! | render         | [`Unit::render`]                | processing   |
//! | commands       | [`Unit::handle_param`], [`Unit::apply_preset`], [`Unit::request_reload`] | processing |
//! | teardown       | [`Unit::teardown`]              | processing   |
//!
//! Units that follow the transport additionally expose
//! [`SyncedUnit`](crate::engine::SyncedUnit) through [`Unit::as_synced`].
//!
//! Parameters live in a fixed-size [`ParamSet`], so setting a value or
//! swapping in a whole preset never allocates.

mod delay;
mod player;
mod registry;
mod stepper;
mod tone;

pub use delay::DelayUnit;
pub use player::PlayerUnit;
pub use registry::{Placement, UnitFactory, UnitRegistry, UnitSpec};
pub use stepper::StepperUnit;
pub use tone::ToneUnit;

use std::path::PathBuf;

use basedrop::Shared;

use crate::engine::{SyncedUnit, TransportView};
use crate::error::{PresetError, PresetResult, ResourceError, ResourceResult};
use crate::preset::{PresetTree, PresetValue};
use crate::resource::{ReloadOutcome, ReloadRequester, ResourceSlot};
use crate::types::{param_key, Frames, ParamName, ParamValue, StereoBuffer, UnitId};

/// Maximum number of parameters per unit
pub const MAX_PARAMS: usize = 16;

// ─────────────────────────────────────────────────────────────────────────────
// Parameters
// ─────────────────────────────────────────────────────────────────────────────

/// Static description of a unit parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub key: u64,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl ParamSpec {
    /// Parameter with a 0..1 range
    pub const fn new(name: &'static str, default: f64) -> Self {
        Self {
            name,
            key: param_key(name),
            default,
            min: 0.0,
            max: 1.0,
        }
    }

    /// Set the value range
    pub const fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Current values for a unit's parameters (fixed size, `Copy`)
#[derive(Debug, Clone, Copy)]
pub struct ParamSet {
    specs: &'static [ParamSpec],
    values: [f64; MAX_PARAMS],
}

impl ParamSet {
    /// Create a set holding every parameter's default
    pub fn new(specs: &'static [ParamSpec]) -> Self {
        debug_assert!(specs.len() <= MAX_PARAMS, "too many parameters");
        let specs = &specs[..specs.len().min(MAX_PARAMS)];
        let mut values = [0.0; MAX_PARAMS];
        for (value, spec) in values.iter_mut().zip(specs) {
            *value = spec.default;
        }
        Self { specs, values }
    }

    pub fn specs(&self) -> &'static [ParamSpec] {
        self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        self.values[index]
    }

    #[inline]
    pub fn get_f32(&self, index: usize) -> f32 {
        self.values[index] as f32
    }

    /// Index of the parameter with the given name hash
    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.position(param_key(name), name)
    }

    /// Key match alone is not enough: two names may share a hash
    fn position(&self, key: u64, name: &str) -> Option<usize> {
        self.specs
            .iter()
            .position(|spec| spec.key == key && spec.name == name)
    }

    /// Set a parameter by name; returns its index, or `None` if unknown
    pub fn set(&mut self, name: &ParamName, value: ParamValue) -> Option<usize> {
        let index = self.position(name.key(), name.as_str())?;
        self.values[index] = self.specs[index].clamp(value.as_f64());
        Some(index)
    }

    /// Build a complete new set from a preset tree
    ///
    /// Starts from defaults; keys missing from the tree keep their default.
    /// Any unknown key or non-numeric value rejects the whole tree and leaves
    /// `self` untouched.
    pub fn with_preset(&self, preset: &PresetTree) -> PresetResult<ParamSet> {
        let mut next = ParamSet::new(self.specs);
        for (key, value) in preset.params.iter() {
            let Some(index) = next.index_of(key) else {
                return Err(PresetError::UnknownKey(key.clone()));
            };
            let number = match value.as_f64() {
                Some(n) if n.is_finite() => n,
                _ => {
                    return Err(PresetError::InvalidValue {
                        key: key.clone(),
                        reason: "expected a finite number".to_string(),
                    })
                }
            };
            next.values[index] = next.specs[index].clamp(number);
        }
        Ok(next)
    }

    /// Export as a preset tree (for persistence)
    pub fn to_preset(&self, unit_type: &str) -> PresetTree {
        let mut tree = PresetTree::for_type(unit_type);
        for (spec, value) in self.specs.iter().zip(self.values.iter()) {
            tree.params
                .insert(spec.name.to_string(), PresetValue::Float(*value));
        }
        tree
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit capability
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a unit may need when it is prepared for insertion
pub struct PrepareContext<'a> {
    pub id: UnitId,
    pub sample_rate: u32,
    /// Largest quantum the unit will ever be asked to render
    pub max_frames: usize,
    pub transport: TransportView,
    pub reloads: &'a mut ReloadRequester,
}

/// The capability interface every unit type implements
///
/// `prepare`, `render` and all command handlers run on the processing
/// thread and must not block or allocate.
pub trait Unit: Send {
    /// Registry type name (e.g. `"player"`)
    fn type_name(&self) -> &'static str;

    fn params(&self) -> &ParamSet;

    fn params_mut(&mut self) -> &mut ParamSet;

    /// Get ready to render (called once, before insertion)
    fn prepare(&mut self, ctx: &mut PrepareContext<'_>);

    /// Render one quantum into `out` (pre-filled with silence)
    fn render(&mut self, out: &mut StereoBuffer, transport: &TransportView);

    /// React to a changed parameter value
    fn param_changed(&mut self, _index: usize) {}

    /// Route a named parameter update; `false` if the name is unknown
    fn handle_param(&mut self, name: &ParamName, value: ParamValue) -> bool {
        match self.params_mut().set(name, value) {
            Some(index) => {
                self.param_changed(index);
                true
            }
            None => false,
        }
    }

    /// Replace the whole configuration, all or nothing
    fn apply_preset(&mut self, preset: &PresetTree) -> PresetResult<()> {
        preset.check_type(self.type_name())?;
        let next = self.params().with_preset(preset)?;
        *self.params_mut() = next;
        for index in 0..next.len() {
            self.param_changed(index);
        }
        Ok(())
    }

    /// Release anything that must not outlive the unit's time in the graph
    fn teardown(&mut self) {}

    /// Transport-following capability, if the unit has one
    fn as_synced(&mut self) -> Option<&mut dyn SyncedUnit> {
        None
    }

    /// Resource slot, for units backed by media
    fn resource_slot(&self) -> Option<&ResourceSlot> {
        None
    }

    /// Ask for new backing media
    fn request_reload(
        &mut self,
        id: UnitId,
        _path: Shared<PathBuf>,
        _reloads: &mut ReloadRequester,
    ) -> ResourceResult<u64> {
        Err(ResourceError::NoResourceSlot(id))
    }

    /// Fold in a completed reload, if any
    fn poll_resource(&mut self, _id: UnitId) -> Option<ReloadOutcome> {
        None
    }

    /// Current position within the unit's resource
    fn playhead(&self) -> Option<Frames> {
        None
    }
}
