//! Messages of the agent replication service.

/// Fully-qualified name of the replication service.
pub const SERVICE: &str = "replication_manager.Replication";

/// Path of the unary `Recover` method.
pub const RECOVER_PATH: &str = "/replication_manager.Replication/Recover";

/// Asks an agent to rebuild the replicas held by the listed members.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Recovery {
    #[prost(string, repeated, tag = "1")]
    pub deleted_agents: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn recovery_wire_format() {
        let msg = Recovery {
            deleted_agents: vec!["agent-0".to_string()],
        };

        let bytes = msg.encode_to_vec();

        // field 1, length-delimited
        assert_eq!(bytes[0], 0x0a);
        assert_eq!(bytes[1], 7);
        assert_eq!(&bytes[2..], b"agent-0");
    }

    #[test]
    fn empty_encodes_to_nothing() {
        assert!(Empty {}.encode_to_vec().is_empty());
    }
}
