//! Named channels shared between threads.
//!
//! A [`Registry`] maps channel names to [`Interface`] instances.
//! An interface can only be used by one holder at a time:
//! [`Registry::acquire`] fails with [`RegistryError::Busy`] instead of blocking
//! while another thread performs an exchange on the same channel.

use crate::{Interface, Status, clock::Clock, port::Port};
use core::fmt::{Display, Formatter};
use log::debug;
use std::{
    collections::BTreeMap,
    string::String,
    sync::{Mutex, MutexGuard, PoisonError, TryLockError},
};

/// Error type for [`Registry`] operations.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum RegistryError {
    /// A channel with the same name is already registered.
    AlreadyRegistered,
    /// No channel with the given name is registered.
    NotFound,
    /// The channel is in use.
    Busy,
}

impl RegistryError {
    /// Returns the signed status code corresponding to the error.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::AlreadyRegistered => -17, // EEXIST
            Self::NotFound => -19,          // ENODEV
            Self::Busy => -16,              // EBUSY
        }
    }
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::AlreadyRegistered => write!(f, "channel already registered"),
            Self::NotFound => write!(f, "channel not found"),
            Self::Busy => write!(f, "channel busy"),
        }
    }
}

impl core::error::Error for RegistryError {}

/// Exclusive access to a registered channel.
pub type Channel<'a, P, C> = MutexGuard<'a, Interface<P, C>>;

/// Registry of named channels.
#[derive(Debug)]
pub struct Registry<P, C> {
    channels: BTreeMap<String, Mutex<Interface<P, C>>>,
}

impl<P, C> Default for Registry<P, C> {
    fn default() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }
}

impl<P: Port, C: Clock> Registry<P, C> {
    /// Constructs an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface under the given name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        intf: Interface<P, C>,
    ) -> Result<(), RegistryError> {
        let name = name.into();

        if self.channels.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered);
        }

        debug!("Register channel {name}");
        self.channels.insert(name, Mutex::new(intf));

        Ok(())
    }

    /// Removes a channel and returns its interface.
    pub fn deregister(&mut self, name: &str) -> Result<Interface<P, C>, RegistryError> {
        let chan = self.channels.remove(name).ok_or(RegistryError::NotFound)?;

        debug!("Deregister channel {name}");

        Ok(chan.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Acquires exclusive access to a channel without blocking.
    pub fn acquire(&self, name: &str) -> Result<Channel<'_, P, C>, RegistryError> {
        let chan = self.channels.get(name).ok_or(RegistryError::NotFound)?;

        match chan.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(err)) => Ok(err.into_inner()),
            Err(TryLockError::WouldBlock) => {
                debug!("Channel {name} is busy");

                Err(RegistryError::Busy)
            }
        }
    }

    /// Returns the names of all registered channels.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}
