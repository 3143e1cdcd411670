use cdrsync_types::CallType;
use serde::Deserialize;

fn default_inbound_marker() -> String {
    "Nebula_World".to_string()
}

fn default_outbound_marker() -> String {
    "Nebula_Loqui".to_string()
}

/// Trunk name fragments that identify call direction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallTypeRules {
    #[serde(default = "default_inbound_marker")]
    pub inbound_marker: String,
    #[serde(default = "default_outbound_marker")]
    pub outbound_marker: String,
}

impl Default for CallTypeRules {
    fn default() -> Self {
        Self {
            inbound_marker: default_inbound_marker(),
            outbound_marker: default_outbound_marker(),
        }
    }
}

impl CallTypeRules {
    /// Inbound when the originating channel is on the inbound trunk, outbound
    /// when either leg is on the outbound trunk, internal otherwise.
    #[must_use]
    pub fn classify(&self, channel: Option<&str>, dstchannel: Option<&str>) -> CallType {
        let channel = channel.unwrap_or_default();
        let dstchannel = dstchannel.unwrap_or_default();
        if channel.contains(&self.inbound_marker) {
            CallType::Inbound
        } else if channel.contains(&self.outbound_marker) || dstchannel.contains(&self.outbound_marker) {
            CallType::Outbound
        } else {
            CallType::Internal
        }
    }
}
