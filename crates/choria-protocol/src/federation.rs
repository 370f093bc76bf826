//! Federation headers and network hop trails.
//!
//! Federation brokers rewrite these while a message transits. Hops are purely
//! diagnostic and never feed security decisions.

/// One hop: inbound connection, processor, outbound connection.
pub type NetworkHop = [String; 3];

/// Messages that carry federation data and a hop trail.
pub trait Federable {
    /// Federation request id, `None` when not federated.
    fn federation_request_id(&self) -> Option<&str>;
    /// Federation reply subject, `None` when not federated.
    fn federation_reply_to(&self) -> Option<&str>;
    /// Federation targets, `None` when not federated.
    fn federation_targets(&self) -> Option<&[String]>;

    /// Set the federation request id, federating the message if needed.
    fn set_federation_request_id(&mut self, id: &str);
    /// Set the federation reply subject, federating the message if needed.
    fn set_federation_reply_to(&mut self, reply: &str);
    /// Set the federation targets, federating the message if needed.
    fn set_federation_targets(&mut self, targets: Vec<String>);
    /// Drop all federation data. Idempotent.
    fn set_unfederated(&mut self);
    /// Whether any federation data is present.
    fn is_federated(&self) -> bool;

    /// Append a hop to the trail.
    fn record_network_hop(&mut self, inbound: &str, processor: &str, outbound: &str);
    /// Hops recorded so far, oldest first.
    fn network_hops(&self) -> &[NetworkHop];
}

/// Copy federation data from one message to another.
pub fn copy_federation_data(from: &impl Federable, to: &mut impl Federable) {
    if !from.is_federated() {
        return;
    }

    if let Some(targets) = from.federation_targets() {
        to.set_federation_targets(targets.to_vec());
    }
    if let Some(reply) = from.federation_reply_to() {
        to.set_federation_reply_to(reply);
    }
    if let Some(id) = from.federation_request_id() {
        to.set_federation_request_id(id);
    }
}

/// Implements [`Federable`] for a struct whose federation header is an
/// `Option<H>` with `request_id`, `reply_to` and `targets` fields.
macro_rules! impl_federable {
    ($ty:ty, $header:ty, federation: $($fed:ident).+, hops: $($hops:ident).+) => {
        impl $crate::federation::Federable for $ty {
            fn federation_request_id(&self) -> Option<&str> {
                self.$($fed).+.as_ref().map(|f| f.request_id.as_str())
            }

            fn federation_reply_to(&self) -> Option<&str> {
                self.$($fed).+.as_ref().map(|f| f.reply_to.as_str())
            }

            fn federation_targets(&self) -> Option<&[String]> {
                self.$($fed).+.as_ref().map(|f| f.targets.as_slice())
            }

            fn set_federation_request_id(&mut self, id: &str) {
                self.$($fed).+.get_or_insert_with(<$header>::default).request_id = id.to_string();
            }

            fn set_federation_reply_to(&mut self, reply: &str) {
                self.$($fed).+.get_or_insert_with(<$header>::default).reply_to = reply.to_string();
            }

            fn set_federation_targets(&mut self, targets: Vec<String>) {
                self.$($fed).+.get_or_insert_with(<$header>::default).targets = targets;
            }

            fn set_unfederated(&mut self) {
                self.$($fed).+ = None;
            }

            fn is_federated(&self) -> bool {
                self.$($fed).+.is_some()
            }

            fn record_network_hop(&mut self, inbound: &str, processor: &str, outbound: &str) {
                self.$($hops).+.push([inbound.to_string(), processor.to_string(), outbound.to_string()]);
            }

            fn network_hops(&self) -> &[$crate::federation::NetworkHop] {
                &self.$($hops).+
            }
        }
    };
}

pub(crate) use impl_federable;
