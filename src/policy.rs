//! Deciding what an authenticated signer may change.
//!
//! Verification (see [`crate::sig0`]) establishes who sent an update;
//! this module decides whether that identity is allowed to perform the
//! changes it asks for. The policy is configured once at startup and is
//! all-or-nothing per update: a single action outside the policy rejects
//! the whole batch, so an update is either applied completely or not at
//! all.

use crate::update::UpdateAction;
use crate::StoredName;
use core::fmt;
use core::str::FromStr;
use domain::base::iana::Rtype;
use domain::base::ToName;
use std::error;
use std::vec::Vec;

//------------ PolicyScope ---------------------------------------------------

/// Which owner names a signer may modify.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PolicyScope {
    /// Only records whose owner name is the signer's own name.
    Exact,

    /// Records at the signer's name or anywhere below it.
    Subtree,
}

impl PolicyScope {
    /// The configuration mnemonic for this scope.
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyScope::Exact => "self",
            PolicyScope::Subtree => "selfsub",
        }
    }
}

impl FromStr for PolicyScope {
    type Err = UnknownPolicyScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self" => Ok(PolicyScope::Exact),
            "selfsub" => Ok(PolicyScope::Subtree),
            _ => Err(UnknownPolicyScope),
        }
    }
}

impl fmt::Display for PolicyScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//------------ UpdatePolicy --------------------------------------------------

/// The update authorization policy of a server instance.
#[derive(Clone, Debug)]
pub struct UpdatePolicy {
    scope: PolicyScope,
    allowed_rtypes: Vec<Rtype>,
}

impl UpdatePolicy {
    /// Creates a policy.
    ///
    /// A policy without any allowed record types would reject every
    /// update; configuring one is a mistake, not a choice.
    pub fn new(
        scope: PolicyScope,
        allowed_rtypes: Vec<Rtype>,
    ) -> Result<Self, EmptyPolicy> {
        if allowed_rtypes.is_empty() {
            return Err(EmptyPolicy);
        }
        Ok(UpdatePolicy {
            scope,
            allowed_rtypes,
        })
    }

    pub fn scope(&self) -> PolicyScope {
        self.scope
    }

    pub fn allowed_rtypes(&self) -> &[Rtype] {
        &self.allowed_rtypes
    }

    /// Checks a batch of actions against the policy.
    ///
    /// Returns the first violation, if any; the batch is only acceptable
    /// as a whole.
    pub fn evaluate(
        &self,
        actions: &[UpdateAction],
        signer: &StoredName,
    ) -> Result<(), PolicyRejection> {
        for action in actions {
            if !self.allowed_rtypes.contains(&action.rtype()) {
                return Err(PolicyRejection::Rtype {
                    owner: action.owner().clone(),
                    rtype: action.rtype(),
                });
            }
            let owner = action.owner();
            // Name comparison works on labels, so a name like
            // `evil-example.` cannot pass itself off as lying under
            // `example.`.
            let permitted = match self.scope {
                PolicyScope::Exact => owner.name_eq(signer),
                PolicyScope::Subtree => owner.ends_with(signer),
            };
            if !permitted {
                return Err(PolicyRejection::Owner {
                    owner: owner.clone(),
                    signer: signer.clone(),
                });
            }
        }
        Ok(())
    }
}

//============ Error Types ===================================================

//------------ UnknownPolicyScope --------------------------------------------

/// A policy scope string was not recognized.
///
/// Fatal at startup: a server must not begin serving with a policy it
/// does not understand.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownPolicyScope;

impl fmt::Display for UnknownPolicyScope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("unknown policy scope")
    }
}

impl error::Error for UnknownPolicyScope {}

//------------ EmptyPolicy ---------------------------------------------------

/// A policy without allowed record types.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EmptyPolicy;

impl fmt::Display for EmptyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("policy allows no record types")
    }
}

impl error::Error for EmptyPolicy {}

//------------ PolicyRejection -----------------------------------------------

/// Why an update batch was not authorized.
#[derive(Clone, Debug)]
pub enum PolicyRejection {
    /// An action touches a record type the policy does not allow.
    Rtype { owner: StoredName, rtype: Rtype },

    /// An action touches an owner name outside the signer's scope.
    Owner {
        owner: StoredName,
        signer: StoredName,
    },
}

impl fmt::Display for PolicyRejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PolicyRejection::Rtype { owner, rtype } => {
                write!(
                    f,
                    "record type {} at {} not allowed by policy",
                    rtype, owner
                )
            }
            PolicyRejection::Owner { owner, signer } => {
                write!(
                    f,
                    "signer {} may not modify records at {}",
                    signer, owner
                )
            }
        }
    }
}

impl error::Error for PolicyRejection {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use domain::base::iana::Class;
    use domain::base::{Record, Ttl};
    use domain::rdata::Ns;
    use std::str::FromStr;

    fn name(name: &str) -> StoredName {
        StoredName::from_str(name).unwrap()
    }

    fn ns_action(owner: &str) -> UpdateAction {
        UpdateAction::Add(Record::new(
            name(owner),
            Class::IN,
            Ttl::from_secs(300),
            Ns::new(name("ns.example.")).into(),
        ))
    }

    fn a_rrset_removal(owner: &str) -> UpdateAction {
        UpdateAction::DeleteRrset(name(owner), domain::base::iana::Rtype::A)
    }

    fn policy(scope: PolicyScope) -> UpdatePolicy {
        UpdatePolicy::new(scope, vec![Rtype::NS]).unwrap()
    }

    #[test]
    fn scope_parsing() {
        assert_eq!("self".parse(), Ok(PolicyScope::Exact));
        assert_eq!("selfsub".parse(), Ok(PolicyScope::Subtree));
        assert_eq!(
            "selfwild".parse::<PolicyScope>(),
            Err(UnknownPolicyScope)
        );
    }

    #[test]
    fn empty_policy_is_refused() {
        assert!(matches!(
            UpdatePolicy::new(PolicyScope::Exact, Vec::new()),
            Err(EmptyPolicy)
        ));
    }

    #[test]
    fn exact_scope() {
        let policy = policy(PolicyScope::Exact);
        let signer = name("ns1.example.");
        assert!(policy
            .evaluate(&[ns_action("ns1.example.")], &signer)
            .is_ok());
        assert!(policy
            .evaluate(&[ns_action("www.example.")], &signer)
            .is_err());
        // A subdomain is not "self" either.
        assert!(policy
            .evaluate(&[ns_action("sub.ns1.example.")], &signer)
            .is_err());
    }

    #[test]
    fn subtree_scope() {
        let policy = policy(PolicyScope::Subtree);
        let signer = name("example.");
        assert!(policy
            .evaluate(&[ns_action("example.")], &signer)
            .is_ok());
        assert!(policy
            .evaluate(&[ns_action("a.example.")], &signer)
            .is_ok());
        assert!(policy
            .evaluate(&[ns_action("other.org.")], &signer)
            .is_err());
    }

    #[test]
    fn subtree_respects_label_boundaries() {
        let policy = policy(PolicyScope::Subtree);
        // The raw string "evil-example." ends in "example." but shares
        // no labels with it.
        assert!(policy
            .evaluate(&[ns_action("evil-example.")], &name("example."))
            .is_err());
    }

    #[test]
    fn rtype_filter() {
        let policy = policy(PolicyScope::Subtree);
        let signer = name("example.");
        assert!(policy
            .evaluate(&[a_rrset_removal("a.example.")], &signer)
            .is_err());
    }

    #[test]
    fn all_or_nothing() {
        let policy = policy(PolicyScope::Subtree);
        let signer = name("example.");
        // One bad action poisons the whole batch.
        let batch =
            [ns_action("a.example."), ns_action("victim.org.")];
        assert!(policy.evaluate(&batch, &signer).is_err());
    }
}
