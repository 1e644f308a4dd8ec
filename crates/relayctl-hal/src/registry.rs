//! [`RelayRegistry`] – immutable table of every relay a controller owns.
//!
//! The registry is built once from a list of
//! [`RelayDefinition`][relayctl_types::RelayDefinition]s. Each definition
//! becomes a [`Relay`] that is either:
//!
//! - **local** – a primary expander pin plus the effective
//!   [`MethodConfig`] of every declared method (defaults overlaid with the
//!   relay's own overrides), or
//! - **delegated** – a boxed [`SubDriver`] built by a
//!   [`SubDriverFactory`] from the relay's auxiliary pins.
//!
//! Construction fails fast: a definition that would leave the validator
//! without the bounds it needs is rejected with [`RelayError::Config`]
//! instead of being accepted with an empty method config.

use std::collections::{BTreeMap, btree_map};
use std::sync::Arc;

use relayctl_types::method::{DURATION_FIELD, STATUS_FIELD};
use relayctl_types::{
    FieldConstraint, Method, MethodConfig, Pin, RelayDefinition, RelayError, SubDriverSpec,
};
use tracing::{debug, info};

use crate::pin::PinAccess;
use crate::sub_driver::{AuxPins, SubDriver, SubDriverFactory};

/// A relay driven directly through one expander pin.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRelay {
    pin: Pin,
    methods: BTreeMap<Method, MethodConfig>,
}

impl LocalRelay {
    pub fn pin(&self) -> Pin {
        self.pin
    }

    /// Effective config of every method this relay accepts.
    pub fn methods(&self) -> &BTreeMap<Method, MethodConfig> {
        &self.methods
    }

    pub fn method(&self, method: Method) -> Option<&MethodConfig> {
        self.methods.get(&method)
    }
}

/// How a relay is actuated.
pub enum RelayKind {
    Local(LocalRelay),
    Delegated(Box<dyn SubDriver>),
}

/// One entry of the registry.
pub struct Relay {
    id: String,
    name: String,
    kind: RelayKind,
}

impl Relay {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RelayKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut RelayKind {
        &mut self.kind
    }

    pub fn as_local(&self) -> Option<&LocalRelay> {
        match &self.kind {
            RelayKind::Local(local) => Some(local),
            RelayKind::Delegated(_) => None,
        }
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self.kind, RelayKind::Delegated(_))
    }
}

/// Immutable set of relays, keyed by id, plus the pin bank they live on.
pub struct RelayRegistry {
    relays: BTreeMap<String, Relay>,
    bank: Arc<dyn PinAccess>,
}

impl RelayRegistry {
    /// Build the registry from `definitions`.
    ///
    /// Local relays marked `output` have their pin configured as a cleared
    /// output. Delegated relays have their `output` auxiliary pins
    /// configured the same way before `factory` builds the sub-driver.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Config`] – empty or duplicate id, a definition with
    ///   both or neither of `pin`/`driver`, a method declared twice, or a
    ///   `run`/`switch` config missing the bounds its validation needs.
    /// - [`RelayError::HardwareFault`] – a pin could not be configured.
    /// - Any error returned by `factory`.
    pub fn build(
        definitions: &[RelayDefinition],
        bank: Arc<dyn PinAccess>,
        factory: &dyn SubDriverFactory,
    ) -> Result<Self, RelayError> {
        let mut relays = BTreeMap::new();

        for def in definitions {
            if def.id.is_empty() {
                return Err(RelayError::Config("relay id must not be empty".into()));
            }
            if relays.contains_key(&def.id) {
                return Err(RelayError::Config(format!("duplicate relay id {:?}", def.id)));
            }

            let kind = match (def.pin, &def.driver) {
                (Some(pin), None) => RelayKind::Local(build_local(def, pin, bank.as_ref())?),
                (None, Some(spec)) => {
                    RelayKind::Delegated(build_delegated(def, spec, &bank, factory)?)
                }
                (Some(_), Some(_)) => {
                    return Err(RelayError::Config(format!(
                        "relay {:?} declares both a pin and a sub-driver",
                        def.id
                    )));
                }
                (None, None) => {
                    return Err(RelayError::Config(format!(
                        "relay {:?} declares neither a pin nor a sub-driver",
                        def.id
                    )));
                }
            };

            relays.insert(
                def.id.clone(),
                Relay {
                    id: def.id.clone(),
                    name: def.name.clone(),
                    kind,
                },
            );
        }

        info!(relays = relays.len(), "relay registry built");
        Ok(Self { relays, bank })
    }

    pub fn get(&self, id: &str) -> Option<&Relay> {
        self.relays.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Relay> {
        self.relays.get_mut(id)
    }

    /// Relays in id order.
    pub fn iter(&self) -> btree_map::Values<'_, String, Relay> {
        self.relays.values()
    }

    pub fn iter_mut(&mut self) -> btree_map::ValuesMut<'_, String, Relay> {
        self.relays.values_mut()
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    /// The pin bank every local relay is wired to.
    pub fn bank(&self) -> &Arc<dyn PinAccess> {
        &self.bank
    }
}

fn build_local(
    def: &RelayDefinition,
    pin: Pin,
    bank: &dyn PinAccess,
) -> Result<LocalRelay, RelayError> {
    if def.output {
        bank.configure(pin, true)?;
    }

    let mut methods = BTreeMap::new();
    for declared in &def.methods {
        let config = MethodConfig::defaults_for(declared.id).overlay(declared);
        check_required_fields(&def.id, declared.id, &config)?;
        if methods.insert(declared.id, config).is_some() {
            return Err(RelayError::Config(format!(
                "relay {:?} declares method {} twice",
                def.id, declared.id
            )));
        }
    }

    debug!(relay = %def.id, %pin, methods = methods.len(), "local relay ready");
    Ok(LocalRelay { pin, methods })
}

fn build_delegated(
    def: &RelayDefinition,
    spec: &SubDriverSpec,
    bank: &Arc<dyn PinAccess>,
    factory: &dyn SubDriverFactory,
) -> Result<Box<dyn SubDriver>, RelayError> {
    if !def.methods.is_empty() {
        return Err(RelayError::Config(format!(
            "relay {:?} delegates to {} and cannot declare local methods",
            def.id, spec.kind
        )));
    }

    let mut pins = BTreeMap::new();
    for (role, aux) in &spec.pins {
        if aux.is_output() {
            bank.configure(aux.pin(), true)?;
        }
        pins.insert(role.clone(), aux.pin());
    }

    let driver = factory.build(def, spec, AuxPins::new(Arc::clone(bank), pins))?;
    debug!(relay = %def.id, kind = %spec.kind, "delegated relay ready");
    Ok(driver)
}

/// `run` needs integer duration bounds and `switch` needs its option list;
/// without them validation could not reject bad payloads.
fn check_required_fields(
    relay: &str,
    method: Method,
    config: &MethodConfig,
) -> Result<(), RelayError> {
    match method {
        Method::Run => match config.integer_bounds(DURATION_FIELD) {
            Some((min, max)) if 0 <= min && min <= max && max <= i64::from(u32::MAX) => Ok(()),
            Some((min, max)) => Err(RelayError::Config(format!(
                "relay {relay:?}: run duration bounds [{min}, {max}] are invalid"
            ))),
            None => Err(RelayError::Config(format!(
                "relay {relay:?}: run requires an integer {DURATION_FIELD:?} constraint"
            ))),
        },
        Method::Switch => match config.constraint(STATUS_FIELD) {
            Some(FieldConstraint::Select { options }) if !options.is_empty() => Ok(()),
            _ => Err(RelayError::Config(format!(
                "relay {relay:?}: switch requires a non-empty {STATUS_FIELD:?} select constraint"
            ))),
        },
        Method::Status => Ok(()),
    }
}
