//! Static configuration of a port.
use tcpm_traits::RpValue;

use crate::SpecificationRevision;

/// How the port decides on its power role when unattached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DualRolePolicy {
    /// Toggle between source and sink, and accept either role.
    ToggleOn,
    /// Do not toggle. The port waits as a sink, but keeps a source role that it already has.
    ToggleOff,
    /// Only attach as a sink.
    ForceSink,
    /// Only attach as a source.
    ForceSource,
}

/// Configuration of a single port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortConfig {
    /// The highest PD revision that the port speaks.
    pub revision: SpecificationRevision,
    /// The Rp value that is advertised as a source, before a PD 3.x contract is established.
    pub rp_value: RpValue,
    /// The dual-role policy that is applied on start-up.
    pub dual_role_policy: DualRolePolicy,
    /// Whether the port can change its power role.
    pub dual_role_power: bool,
    /// Whether the port can change its data role.
    pub dual_role_data: bool,
    /// Whether the port can source VCONN.
    pub vconn_capable: bool,
    /// Whether the port supports fast role swap as the new source.
    pub fast_role_swap: bool,
    /// Whether chunked extended messages are supported.
    pub extended_messages: bool,
    /// Whether PD communication is enabled at all. Without it, the port only does Type-C.
    pub pd_enabled: bool,
    /// Whether the port discovers the identity of its partner on its own, while it is the DFP.
    pub discover_identity: bool,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            revision: SpecificationRevision::R3_X,
            rp_value: RpValue::Current1A5,
            dual_role_policy: DualRolePolicy::ToggleOn,
            dual_role_power: true,
            dual_role_data: true,
            vconn_capable: true,
            fast_role_swap: false,
            extended_messages: true,
            pd_enabled: true,
            discover_identity: true,
        }
    }
}
