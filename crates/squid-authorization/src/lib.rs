//! sQuid Authorization - capability resolution
//!
//! [`CapabilityResolver::resolve`] turns an identity snapshot plus an
//! optional action and module into a [`Decision`]. Evaluation walks an
//! ordered [`RuleTable`]; the first rule that denies wins, advisories from
//! earlier rules are carried onto the final decision.
//!
//! Default rule order:
//!
//! 1. [`Rule::Status`]: non-ACTIVE identities are denied
//! 2. [`Rule::TypePermission`]: structural, financial and governance actions
//!    need the matching permission flag for the identity type
//! 3. [`Rule::Kyc`]: financial, governance and verification actions need
//!    approved KYC when KYC is required
//! 4. [`Rule::ModuleAccess`]: privacy-level module gate
//! 5. [`Rule::Governance`]: DAO advisory, PARENT hard denial
//! 6. [`Rule::Balance`]: optional minimum balance
//!
//! Anything that passes every rule is allowed. Policy tables and the rule
//! order are data; see [`PolicyTables`] and [`RuleTable`].

pub mod action;
pub mod config;
pub mod decision;
pub mod error;
pub mod module;
pub mod policy;
pub mod resolver;
pub mod rules;
pub mod summary;

pub use action::{ActionTags, ActionTaxonomy, ParsedAction, StructuralOp};
pub use config::ResolverConfig;
pub use decision::{Advisory, Decision, DenialKind, KycMissing};
pub use error::ResolverError;
pub use module::StaticModuleRegistry;
pub use policy::{Permission, PolicyTables, TypePermissions};
pub use resolver::{CapabilityResolver, ResolveRequest};
pub use rules::{ModuleView, Rule, RuleContext, RuleTable, Verdict};
pub use summary::CapabilitySummary;
