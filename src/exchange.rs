// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! This module provides the builder used to describe the exchanges the image
//! pipeline declares at startup. Both `images` and `users` are direct, durable
//! exchanges that are never auto-deleted.

use lapin::options::ExchangeDeclareOptions;

/// Exchange carrying the raw-bytes work queues and the internal JSON follow-ups.
pub const IMAGES_EXCHANGE: &str = "images";
/// Exchange carrying follow-ups whose resulting state is owned by the user and
/// hotel services.
pub const USERS_EXCHANGE: &str = "users";

/// Exchange types used by the platform.
///
/// - Direct: routes on an exact routing-key match
/// - Fanout: copies every message to all bound queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        }
    }
}

/// Definition of a RabbitMQ exchange with its configuration parameters.
///
/// Two definitions that compare equal describe the same broker object, so
/// re-declaring one is a no-op on the broker side.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
}

impl ExchangeDefinition {
    /// Creates a new exchange definition with the given name.
    ///
    /// By default, the exchange is a non-durable Direct exchange.
    ///
    /// # Parameters
    /// * `name` - The name of the exchange
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            delete: false,
            durable: false,
        }
    }

    /// The exchange name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the exchange type to Direct.
    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Sets the exchange type to Fanout.
    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub(crate) fn options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            durable: self.durable,
            auto_delete: self.delete,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durable_direct_exchange_options() {
        let def = ExchangeDefinition::new(IMAGES_EXCHANGE).direct().durable();
        let opts = def.options();

        assert_eq!(def.name(), "images");
        assert_eq!(def.kind, ExchangeKind::Direct);
        assert!(opts.durable);
        assert!(!opts.auto_delete);
        assert!(!opts.internal);
    }

    #[test]
    fn identical_definitions_compare_equal() {
        let a = ExchangeDefinition::new(USERS_EXCHANGE).direct().durable();
        let b = ExchangeDefinition::new(USERS_EXCHANGE).durable();
        assert_eq!(a, b);
        assert_ne!(a, b.fanout());
    }
}
