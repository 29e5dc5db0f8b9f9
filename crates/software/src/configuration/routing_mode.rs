use num_derive::{FromPrimitive, ToPrimitive};

/// Determines how the [`Router`](crate::router::Router) picks destinations for note events.
///
/// Events other than Note On and Note Off always consult the routing table, whatever the mode.
#[derive(Debug, Default, Copy, Clone, ToPrimitive, FromPrimitive, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoutingMode {
    /// Notes are delivered to every port whose routing rules match them.
    #[default]
    Table,
    /// Notes are spread over the ports of their channel's group in the voice balancer, one polyphony slot per
    /// sounding note. A Note On finding no free slot is dropped.
    Balance,
}
impl super::CycleConfig for RoutingMode {}
