use std::fmt::{Debug, Formatter};
use std::hash::Hash;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Small integer code identifying a message kind on one kind of link. Each link kind and message
///  category has its own code type, so a handler registered for master traffic can never be
///  looked up with a code that arrived on a peer-to-peer link (and vice versa).
pub trait MessageCode: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    fn from_raw(raw: u8) -> Self;
    fn raw(self) -> u8;
}

macro_rules! message_code {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(pub u8);

        impl MessageCode for $name {
            fn from_raw(raw: u8) -> Self {
                Self(raw)
            }

            fn raw(self) -> u8 {
                self.0
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", $label, self.0)
            }
        }
    };
}

message_code!(
    /// Operation sub-code of requests and responses exchanged with the master node
    MasterOperationCode, "MasterOp"
);
message_code!(
    /// Code of events sent by the master node
    MasterEventCode, "MasterEvt"
);
message_code!(
    /// Operation code of requests and responses exchanged between sub-servers
    PeerOperationCode, "PeerOp"
);
message_code!(
    /// Code of events exchanged between sub-servers
    PeerEventCode, "PeerEvt"
);

impl MasterOperationCode {
    /// Sent by a sub-server on every (re)connection, announcing its identity to the master.
    pub const REGISTER_SUB_SERVER: MasterOperationCode = MasterOperationCode(1);
}

/// Return codes used in responses throughout the fleet. Values between 2 and 50 are reserved.
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(i16)]
pub enum ErrorCode {
    Ok = 0,
    Fatal = 1,
    ParameterOutOfRange = 51,
    OperationNotSupported,
    InvalidOperationParameter,
    InvalidOperation,
    /// user name or password is wrong, the login is refused
    InvalidUserPass,
    /// something is wrong with the character, details are in the response's debug message
    InvalidCharacter,
}
