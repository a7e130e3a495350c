//! Security actions and decoded security attributes.

use std::fmt;

use crate::metadata::{customattributes::CustomAttributeNamedArgument, typesystem::TypeName};

/// When and how a declarative permission is enforced (`DeclSecurity.Action`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityAction {
    /// Refuse demands for the permission
    Deny,
    /// Check all callers on the stack
    Demand,
    /// Satisfy demands for the permission without further checks
    Assert,
    /// Non-CAS demand
    NonCasDemand,
    /// Check the immediate caller at link time
    LinkDemand,
    /// Required to inherit from the class or override the method
    InheritanceDemand,
    /// Minimum permissions to run
    RequestMinimum,
    /// Optional permissions
    RequestOptional,
    /// Permissions to refuse
    RequestRefuse,
    /// Reserved
    PrejitGrant,
    /// Reserved
    PrejitDeny,
    /// Non-CAS link demand
    NonCasLinkDemand,
    /// Non-CAS inheritance demand
    NonCasInheritance,
    /// Link demand, choice form
    LinkDemandChoice,
    /// Inheritance demand, choice form
    InheritanceDemandChoice,
    /// Demand, choice form
    DemandChoice,
    /// Refuse everything but the permission
    PermitOnly,
    /// A value outside the known range
    Unknown(u16),
}

impl From<u16> for SecurityAction {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => SecurityAction::Deny,
            0x0002 => SecurityAction::Demand,
            0x0003 => SecurityAction::Assert,
            0x0004 => SecurityAction::NonCasDemand,
            0x0005 => SecurityAction::LinkDemand,
            0x0006 => SecurityAction::InheritanceDemand,
            0x0007 => SecurityAction::RequestMinimum,
            0x0008 => SecurityAction::RequestOptional,
            0x0009 => SecurityAction::RequestRefuse,
            0x000A => SecurityAction::PrejitGrant,
            0x000B => SecurityAction::PrejitDeny,
            0x000C => SecurityAction::NonCasLinkDemand,
            0x000D => SecurityAction::NonCasInheritance,
            0x000E => SecurityAction::LinkDemandChoice,
            0x000F => SecurityAction::InheritanceDemandChoice,
            0x0010 => SecurityAction::DemandChoice,
            0x0011 => SecurityAction::PermitOnly,
            _ => SecurityAction::Unknown(value),
        }
    }
}

impl fmt::Display for SecurityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityAction::Unknown(value) => write!(f, "Unknown(0x{value:04x})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// One permission attribute of a declaration
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityAttribute {
    /// The permission attribute type, usually assembly-qualified
    pub attribute_type: TypeName,
    /// Field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl SecurityAttribute {
    /// The named argument called `name`, if present
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&CustomAttributeNamedArgument> {
        self.named_args.iter().find(|arg| arg.name == name)
    }
}
