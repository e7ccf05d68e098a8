use std::collections::HashMap;
use std::fmt;

use super::message::Message;

/// Something that reacts to a message on a registered address.
///
/// `C` is the context the handler mutates; closures of the matching shape
/// implement this automatically.
pub trait Handler<C>: Send {
    /// Handles one decoded message
    fn handle(&self, message: &Message, ctx: &mut C);
}

impl<C, F> Handler<C> for F
where
    F: Fn(&Message, &mut C) + Send,
{
    fn handle(&self, message: &Message, ctx: &mut C) {
        self(message, ctx)
    }
}

/// Exact-match address router
pub struct DispatchTable<C> {
    handlers: HashMap<String, Box<dyn Handler<C>>>,
}

impl<C> DispatchTable<C> {
    /// Creates an empty table
    pub fn new() -> Self {
        DispatchTable {
            handlers: HashMap::new(),
        }
    }

    /// Binds a handler to an address, replacing any earlier binding.
    /// Returns whether a handler was replaced.
    pub fn register(&mut self, address: impl Into<String>, handler: impl Handler<C> + 'static) -> bool {
        self.handlers
            .insert(address.into(), Box::new(handler))
            .is_some()
    }

    /// Runs the handler bound to the message's address.
    /// Returns `false` when no handler is registered for it.
    pub fn dispatch(&self, message: &Message, ctx: &mut C) -> bool {
        match self.handlers.get(&message.address) {
            Some(handler) => {
                handler.handle(message, ctx);
                true
            }
            None => false,
        }
    }

    /// Returns whether an address has a handler
    pub fn contains(&self, address: &str) -> bool {
        self.handlers.contains_key(address)
    }

    /// Number of registered addresses
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> Default for DispatchTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for DispatchTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut addresses: Vec<_> = self.handlers.keys().collect();
        addresses.sort();
        f.debug_struct("DispatchTable")
            .field("addresses", &addresses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        hits: Vec<String>,
    }

    #[test]
    fn test_exact_match_dispatch() {
        let mut table = DispatchTable::<Counter>::new();
        table.register("/m", |msg: &Message, ctx: &mut Counter| {
            ctx.hits.push(msg.address.clone())
        });

        let mut ctx = Counter::default();
        assert!(table.dispatch(&Message::new("/m"), &mut ctx));
        assert_eq!(ctx.hits, vec!["/m"]);

        // No prefix or wildcard matching
        assert!(!table.dispatch(&Message::new("/m/1"), &mut ctx));
        assert!(!table.dispatch(&Message::new("/*"), &mut ctx));
        assert!(!table.dispatch(&Message::new("/M"), &mut ctx));
        assert_eq!(ctx.hits.len(), 1);
    }

    #[test]
    fn test_register_replaces() {
        let mut table = DispatchTable::<Counter>::new();
        assert!(!table.register("/a", |_: &Message, ctx: &mut Counter| {
            ctx.hits.push("first".into())
        }));
        assert!(table.register("/a", |_: &Message, ctx: &mut Counter| {
            ctx.hits.push("second".into())
        }));
        assert_eq!(table.len(), 1);

        let mut ctx = Counter::default();
        table.dispatch(&Message::new("/a"), &mut ctx);
        assert_eq!(ctx.hits, vec!["second"]);
    }

    #[test]
    fn test_empty_table() {
        let table = DispatchTable::<Counter>::default();
        assert!(table.is_empty());
        assert!(!table.contains("/m"));
        assert!(!table.dispatch(&Message::new("/m"), &mut Counter::default()));
    }
}
