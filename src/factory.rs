//! Command factory registry.
//!
//! Factories turn a [`SnacPacket`] into a [`SnacCommand`]. A registry maps
//! command types to factories with three levels of specificity and may defer
//! to a shared fallback registry injected at construction.

use std::{fmt, sync::Arc};

use dashmap::DashMap;

use crate::{command::SnacCommand, packet::SnacPacket};

/// Key under which a factory is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmdType {
    /// One specific family and subtype.
    Exact {
        /// Family code.
        family: u16,
        /// Subtype code.
        subtype: u16,
    },
    /// Every subtype of one family.
    Family(u16),
    /// Every command.
    Any,
}

impl CmdType {
    /// Shorthand for [`CmdType::Exact`].
    #[must_use]
    pub const fn exact(family: u16, subtype: u16) -> Self { Self::Exact { family, subtype } }
}

impl fmt::Display for CmdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact { family, subtype } => write!(f, "{family:#06x}/{subtype:#06x}"),
            Self::Family(family) => write!(f, "{family:#06x}/*"),
            Self::Any => f.write_str("*/*"),
        }
    }
}

/// Decoder for one or more command types.
pub trait CommandFactory: Send + Sync {
    /// Command types this factory understands; used by
    /// [`CommandFactoryRegistry::register_all`].
    fn supported_types(&self) -> Vec<CmdType>;

    /// Decode `packet`, or return `None` if it cannot be represented.
    fn decode(&self, packet: &SnacPacket) -> Option<Arc<dyn SnacCommand>>;
}

impl<F> CommandFactory for F
where
    F: Fn(&SnacPacket) -> Option<Arc<dyn SnacCommand>> + Send + Sync,
{
    fn supported_types(&self) -> Vec<CmdType> { Vec::new() }

    fn decode(&self, packet: &SnacPacket) -> Option<Arc<dyn SnacCommand>> { self(packet) }
}

/// Concurrent map from [`CmdType`] to factory.
///
/// Lookups run concurrently with registration; registration normally happens
/// once during setup.
#[derive(Default)]
pub struct CommandFactoryRegistry {
    factories: DashMap<CmdType, Arc<dyn CommandFactory>>,
    fallback: Option<Arc<CommandFactoryRegistry>>,
}

impl fmt::Debug for CommandFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFactoryRegistry")
            .field("registered", &self.factories.len())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl CommandFactoryRegistry {
    /// Create an empty registry with no fallback.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create an empty registry that consults `fallback` when it has no match
    /// of its own.
    #[must_use]
    pub fn with_fallback(fallback: Arc<CommandFactoryRegistry>) -> Self {
        Self {
            factories: DashMap::new(),
            fallback: Some(fallback),
        }
    }

    /// The fallback registry, if any.
    #[must_use]
    pub fn fallback(&self) -> Option<&Arc<CommandFactoryRegistry>> { self.fallback.as_ref() }

    /// Register `factory` for `ty`, replacing any previous registration.
    pub fn register(&self, ty: CmdType, factory: Arc<dyn CommandFactory>) {
        tracing::trace!(%ty, "registering command factory");
        self.factories.insert(ty, factory);
    }

    /// Register `factory` for every type it declares.
    pub fn register_all(&self, factory: &Arc<dyn CommandFactory>) {
        for ty in factory.supported_types() {
            self.register(ty, Arc::clone(factory));
        }
    }

    /// Remove whatever is registered for `ty`.
    pub fn remove(&self, ty: CmdType) -> Option<Arc<dyn CommandFactory>> {
        self.factories.remove(&ty).map(|(_, factory)| factory)
    }

    /// Remove every registration pointing at `factory`.
    pub fn remove_factory(&self, factory: &Arc<dyn CommandFactory>) {
        self.factories
            .retain(|_, registered| !same_factory(registered, factory));
    }

    /// Factory registered under exactly `ty` in this registry.
    #[must_use]
    pub fn get(&self, ty: CmdType) -> Option<Arc<dyn CommandFactory>> {
        self.factories.get(&ty).map(|entry| Arc::clone(entry.value()))
    }

    /// Find the most specific factory for `family`/`subtype`.
    ///
    /// Tries an exact match, then the family wildcard, then the global
    /// wildcard; if none matches, repeats the search on the fallback.
    #[must_use]
    pub fn resolve(&self, family: u16, subtype: u16) -> Option<Arc<dyn CommandFactory>> {
        self.resolve_local(family, subtype).or_else(|| {
            self.fallback
                .as_ref()
                .and_then(|fallback| fallback.resolve(family, subtype))
        })
    }

    fn resolve_local(&self, family: u16, subtype: u16) -> Option<Arc<dyn CommandFactory>> {
        [
            CmdType::exact(family, subtype),
            CmdType::Family(family),
            CmdType::Any,
        ]
        .into_iter()
        .find_map(|ty| self.get(ty))
    }

    /// Decode `packet` with the resolved factory.
    #[must_use]
    pub fn decode(&self, packet: &SnacPacket) -> Option<Arc<dyn SnacCommand>> {
        self.resolve(packet.family(), packet.subtype())
            .and_then(|factory| factory.decode(packet))
    }

    /// Number of registrations held directly by this registry.
    #[must_use]
    pub fn len(&self) -> usize { self.factories.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.factories.is_empty() }
}

fn same_factory(a: &Arc<dyn CommandFactory>, b: &Arc<dyn CommandFactory>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{command::RawCommand, reqid::RequestId};

    struct Tagged(&'static str);

    impl CommandFactory for Tagged {
        fn supported_types(&self) -> Vec<CmdType> { vec![CmdType::exact(7, 1), CmdType::exact(7, 2)] }

        fn decode(&self, packet: &SnacPacket) -> Option<Arc<dyn SnacCommand>> {
            Some(Arc::new(RawCommand::new(
                packet.family(),
                packet.subtype(),
                self.0.as_bytes(),
            )))
        }
    }

    fn tagged(tag: &'static str) -> Arc<dyn CommandFactory> { Arc::new(Tagged(tag)) }

    fn tag_of(registry: &CommandFactoryRegistry, family: u16, subtype: u16) -> Option<Vec<u8>> {
        let packet = SnacPacket::new(family, subtype, 0, RequestId::new(1), bytes::Bytes::new());
        registry.decode(&packet).map(|cmd| {
            cmd.downcast_ref::<RawCommand>()
                .map(|raw| raw.payload().to_vec())
                .unwrap_or_default()
        })
    }

    #[fixture]
    fn layered() -> CommandFactoryRegistry {
        let registry = CommandFactoryRegistry::new();
        registry.register(CmdType::exact(1, 2), tagged("exact"));
        registry.register(CmdType::Family(1), tagged("family"));
        registry.register(CmdType::Any, tagged("any"));
        registry
    }

    #[rstest]
    #[case::exact(1, 2, "exact")]
    #[case::family(1, 9, "family")]
    #[case::global(2, 5, "any")]
    fn resolves_most_specific(
        layered: CommandFactoryRegistry,
        #[case] family: u16,
        #[case] subtype: u16,
        #[case] expected: &str,
    ) {
        assert_eq!(
            tag_of(&layered, family, subtype),
            Some(expected.as_bytes().to_vec())
        );
    }

    #[rstest]
    fn removing_exact_falls_back_to_family(layered: CommandFactoryRegistry) {
        assert!(layered.remove(CmdType::exact(1, 2)).is_some());
        assert_eq!(tag_of(&layered, 1, 2), Some(b"family".to_vec()));
    }

    #[test]
    fn last_registration_wins() {
        let registry = CommandFactoryRegistry::new();
        registry.register(CmdType::Any, tagged("first"));
        registry.register(CmdType::Any, tagged("second"));
        assert_eq!(tag_of(&registry, 3, 3), Some(b"second".to_vec()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn consults_fallback_only_without_local_match() {
        let fallback = Arc::new(CommandFactoryRegistry::new());
        fallback.register(CmdType::Any, tagged("fallback"));
        let registry = CommandFactoryRegistry::with_fallback(Arc::clone(&fallback));
        registry.register(CmdType::Family(4), tagged("local"));

        assert_eq!(tag_of(&registry, 4, 1), Some(b"local".to_vec()));
        assert_eq!(tag_of(&registry, 5, 1), Some(b"fallback".to_vec()));
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        assert!(CommandFactoryRegistry::new().resolve(1, 1).is_none());
    }

    #[test]
    fn register_all_uses_supported_types_and_remove_factory_clears_them() {
        let registry = CommandFactoryRegistry::new();
        let factory = tagged("multi");
        registry.register_all(&factory);
        registry.register(CmdType::Any, tagged("other"));
        assert_eq!(registry.len(), 3);

        registry.remove_factory(&factory);
        assert_eq!(registry.len(), 1);
        assert_eq!(tag_of(&registry, 7, 1), Some(b"other".to_vec()));
    }

    #[test]
    fn closures_act_as_factories() {
        let registry = CommandFactoryRegistry::new();
        let factory: Arc<dyn CommandFactory> =
            Arc::new(|_: &SnacPacket| -> Option<Arc<dyn SnacCommand>> { None });
        registry.register(CmdType::Any, factory);
        assert!(registry.resolve(1, 1).is_some());
        assert_eq!(tag_of(&registry, 1, 1), None);
    }
}
