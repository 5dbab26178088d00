//! Where registration changes are reported.

use tokio::sync::mpsc;

use crate::record::RegistrationInfo;

/// The current registrations of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationUpdate {
    pub address: String,
    pub registrations: Vec<RegistrationInfo>,
}

/// Receiver of registration changes, typically the host's routing layer.
///
/// Called at least once per observed change, possibly more, and possibly
/// with the same list as last time. Implementations must not block for long;
/// they run on the registry's dispatcher.
pub trait RegistrationSink: Send + Sync {
    fn registrations_updated(&self, address: &str, registrations: Vec<RegistrationInfo>);
}

impl<F> RegistrationSink for F
where
    F: Fn(&str, Vec<RegistrationInfo>) + Send + Sync,
{
    fn registrations_updated(&self, address: &str, registrations: Vec<RegistrationInfo>) {
        self(address, registrations)
    }
}

/// Forwards every update into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RegistrationUpdate>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RegistrationUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RegistrationSink for ChannelSink {
    fn registrations_updated(&self, address: &str, registrations: Vec<RegistrationInfo>) {
        // Nobody listening is not an error for the registry.
        let _ = self.tx.send(RegistrationUpdate {
            address: address.to_string(),
            registrations,
        });
    }
}
