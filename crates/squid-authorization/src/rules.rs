//! Ordered rule table
//!
//! Each [`Rule`] is a tagged variant evaluated against a [`RuleContext`].
//! Rules either pass, pass with an advisory, or deny. The table order is
//! the decision precedence.

use crate::action::{ActionTags, StructuralOp};
use crate::decision::{
    Advisory, Decision, DenialKind, KycMissing, REASON_INSUFFICIENT_BALANCE,
    REASON_INSUFFICIENT_PERMISSIONS, REASON_KYC_REQUIRED,
};
use crate::policy::PolicyTables;
use serde::{Deserialize, Serialize};
use squid_core::{GovernanceLevel, Identity, IdentityStatus, PrivacyLevel};

/// Role that would lift a KYC denial.
pub const ROLE_KYC_VERIFIED: &str = "kyc-verified";
/// Role that would lift a parental denial.
pub const ROLE_PARENT_GUARDIAN: &str = "parent-guardian";
/// Role that would lift a DAO-only module denial.
pub const ROLE_DAO_MEMBER: &str = "dao-member";

/// One decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Non-ACTIVE identities are denied
    Status,
    /// Identity type must hold the permission the action needs
    TypePermission,
    /// KYC-sensitive actions need approved KYC when it is required
    Kyc,
    /// Privacy level restricts which modules are reachable
    ModuleAccess,
    /// DAO governance advises, PARENT governance denies
    Governance,
    /// Available balance must cover the action minimum
    Balance,
}

/// Module as seen by the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleView<'a> {
    /// Module id
    pub id: &'a str,
    /// Using the module reveals the identity
    pub discloses_identity: bool,
    /// Module moves value
    pub financial: bool,
}

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Identity snapshot
    pub identity: &'a Identity,
    /// Requested action
    pub action: Option<&'a str>,
    /// Tags of the requested action (all false when absent)
    pub tags: ActionTags,
    /// Structural operation named by the action
    pub structural: Option<StructuralOp>,
    /// Requested module
    pub module: Option<ModuleView<'a>>,
    /// Available balance supplied with the request
    pub balance: Option<u64>,
    /// Policy data
    pub tables: &'a PolicyTables,
}

/// Result of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Rule does not object
    Pass,
    /// Rule does not object but annotates the decision
    Advise(Advisory),
    /// Rule denies
    Deny(Decision),
}

impl Rule {
    /// Evaluate this rule.
    pub fn evaluate(self, ctx: &RuleContext<'_>) -> Verdict {
        match self {
            Rule::Status => status(ctx),
            Rule::TypePermission => type_permission(ctx),
            Rule::Kyc => kyc(ctx),
            Rule::ModuleAccess => module_access(ctx),
            Rule::Governance => governance(ctx),
            Rule::Balance => balance(ctx),
        }
    }
}

fn status(ctx: &RuleContext<'_>) -> Verdict {
    let status = ctx.identity.status;
    let reason = match status {
        IdentityStatus::Active => return Verdict::Pass,
        IdentityStatus::Inactive => "identity inactive",
        IdentityStatus::Suspended => "identity suspended",
    };
    Verdict::Deny(Decision::deny(
        Rule::Status,
        DenialKind::Inactive { status },
        reason,
    ))
}

fn type_permission(ctx: &RuleContext<'_>) -> Verdict {
    let identity = ctx.identity;
    if ctx.structural == Some(StructuralOp::Create) {
        let rules = &identity.creation_rules;
        let reason = if rules.is_leaf_only() {
            Some("identity type cannot create sub-identities")
        } else if identity.depth >= rules.max_depth {
            Some("maximum depth reached")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Verdict::Deny(Decision::deny(
                Rule::TypePermission,
                DenialKind::InsufficientPermissions,
                reason,
            ));
        }
    }

    let permissions = ctx.tables.permissions(identity.identity_type);
    let Some(missing) = permissions.missing_for(&ctx.tags, ctx.structural) else {
        return Verdict::Pass;
    };
    let mut decision = Decision::deny(
        Rule::TypePermission,
        DenialKind::InsufficientPermissions,
        REASON_INSUFFICIENT_PERMISSIONS,
    );
    if let Some(holder) = ctx.tables.holder_of(missing) {
        decision = decision.with_required_role(holder.as_str());
    }
    Verdict::Deny(decision)
}

fn kyc(ctx: &RuleContext<'_>) -> Verdict {
    let kyc = &ctx.identity.kyc;
    if !ctx.tags.is_kyc_sensitive() || !kyc.is_blocking() {
        return Verdict::Pass;
    }
    let missing = if kyc.submitted {
        KycMissing::Approval
    } else {
        KycMissing::Submission
    };
    Verdict::Deny(
        Decision::deny(
            Rule::Kyc,
            DenialKind::KycRequired { missing },
            REASON_KYC_REQUIRED,
        )
        .with_required_role(ROLE_KYC_VERIFIED),
    )
}

fn module_access(ctx: &RuleContext<'_>) -> Verdict {
    let Some(module) = ctx.module else {
        return Verdict::Pass;
    };
    let identity = ctx.identity;
    let denial = || DenialKind::ModuleRestricted {
        module: module.id.to_string(),
    };

    match identity.privacy_level {
        PrivacyLevel::Public => Verdict::Pass,
        PrivacyLevel::Anonymous if module.discloses_identity => Verdict::Deny(Decision::deny(
            Rule::ModuleAccess,
            denial(),
            format!("module {} would disclose an anonymous identity", module.id),
        )),
        PrivacyLevel::Anonymous => Verdict::Pass,
        PrivacyLevel::Private if module.financial => {
            let mut decision = Decision::deny(
                Rule::ModuleAccess,
                denial(),
                format!("module {} is not available to private identities", module.id),
            );
            if identity.governance_level == GovernanceLevel::Parent {
                decision = decision.with_required_role(ROLE_PARENT_GUARDIAN);
            }
            Verdict::Deny(decision)
        }
        PrivacyLevel::Private => Verdict::Pass,
        PrivacyLevel::DaoOnly if identity.governance_level == GovernanceLevel::Dao => Verdict::Pass,
        PrivacyLevel::DaoOnly => Verdict::Deny(
            Decision::deny(
                Rule::ModuleAccess,
                denial(),
                format!("module {} is restricted to DAO members", module.id),
            )
            .with_required_role(ROLE_DAO_MEMBER),
        ),
    }
}

fn governance(ctx: &RuleContext<'_>) -> Verdict {
    if ctx.action.is_none() || !ctx.tags.needs_guardian() {
        return Verdict::Pass;
    }
    match ctx.identity.governance_level {
        GovernanceLevel::SelfGoverned => Verdict::Pass,
        GovernanceLevel::Dao => Verdict::Advise(Advisory::DaoApprovalRequired),
        GovernanceLevel::Parent => Verdict::Deny(
            Decision::deny(
                Rule::Governance,
                DenialKind::GovernanceRestricted,
                REASON_INSUFFICIENT_PERMISSIONS,
            )
            .with_required_role(ROLE_PARENT_GUARDIAN),
        ),
    }
}

fn balance(ctx: &RuleContext<'_>) -> Verdict {
    let (Some(action), Some(available)) = (ctx.action, ctx.balance) else {
        return Verdict::Pass;
    };
    match ctx.tables.min_balances.get(action) {
        Some(&required) if available < required => Verdict::Deny(
            Decision::deny(
                Rule::Balance,
                DenialKind::InsufficientBalance { available },
                REASON_INSUFFICIENT_BALANCE,
            )
            .with_required_balance(required),
        ),
        _ => Verdict::Pass,
    }
}

/// Ordered list of rules; the first denial wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// Table with a custom order.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Walk the table, collecting advisories until a rule denies.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Decision {
        let mut advisories = Vec::new();
        for rule in &self.rules {
            match rule.evaluate(ctx) {
                Verdict::Pass => {}
                Verdict::Advise(advisory) => {
                    if !advisories.contains(&advisory) {
                        advisories.push(advisory);
                    }
                }
                Verdict::Deny(mut decision) => {
                    decision.advisories = advisories;
                    return decision;
                }
            }
        }
        Decision::allow(advisories)
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new(vec![
            Rule::Status,
            Rule::TypePermission,
            Rule::Kyc,
            Rule::ModuleAccess,
            Rule::Governance,
            Rule::Balance,
        ])
    }
}
