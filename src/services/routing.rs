//! Decides which party an intake document belongs to.
//!
//! [`classify`] maps a kind to the category of entity that owns it,
//! [`PartyRoster::load`] fetches the client's persons and company, and
//! [`resolve_owner`] picks the concrete owner. Resolution never guesses: when it
//! cannot pick an owner it says why, and the caller applies its own policy.

use std::fmt;
use std::str::FromStr;

use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{company, person};
use crate::models::document_kind::DocumentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetCategory {
    Person,
    Company,
    Property,
    Client,
}

/// Anything not tied to a person, a company or a property is a client-level paper.
pub fn classify(kind: DocumentKind) -> TargetCategory {
    match kind {
        DocumentKind::IdentityDocument | DocumentKind::BirthCertificate => {
            TargetCategory::Person
        }
        DocumentKind::CompanyRegistration | DocumentKind::CompanyStatutes => {
            TargetCategory::Company
        }
        DocumentKind::Diagnostics
        | DocumentKind::TitleDeed
        | DocumentKind::CondominiumRegulations
        | DocumentKind::SubdivisionCharter
        | DocumentKind::AssociationStatutes => TargetCategory::Property,
        _ => TargetCategory::Client,
    }
}

/// The case an upload happens under, after the intake link has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeContext {
    pub token: String,
    pub intake_link_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    /// Zero-based position among the client's persons, primary first.
    pub person_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Owner {
    Person(Uuid),
    Company(Uuid),
    Property(Uuid),
    Client(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnresolvedReason {
    #[error("no client is attached to this intake")]
    NoClient,
    #[error("client has no person on file")]
    NoPersons,
    #[error("person index {index} is out of range ({available} persons on file)")]
    PersonIndexOutOfRange { index: usize, available: usize },
    #[error("client has no company on file")]
    NoCompany,
    #[error("no property is attached to this intake")]
    NoProperty,
}

/// What to do when an upload names a person that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonIndexPolicy {
    FallbackToPrimary,
    Reject,
}

impl FromStr for PersonIndexPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fallback" | "fallback_to_primary" => Ok(PersonIndexPolicy::FallbackToPrimary),
            "reject" => Ok(PersonIndexPolicy::Reject),
            other => Err(format!("expected `fallback` or `reject`, got `{}`", other)),
        }
    }
}

/// The four nullable foreign keys of a document row. Built from at most one
/// owner, so at most one is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerKeys {
    pub person_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
}

impl OwnerKeys {
    pub fn is_orphan(&self) -> bool {
        *self == OwnerKeys::default()
    }

    /// Stable text form used in the documents unique index.
    pub fn owner_key(&self) -> String {
        match (self.person_id, self.company_id, self.client_id, self.property_id) {
            (Some(id), _, _, _) => format!("person:{}", id),
            (_, Some(id), _, _) => format!("company:{}", id),
            (_, _, Some(id), _) => format!("client:{}", id),
            (_, _, _, Some(id)) => format!("property:{}", id),
            _ => "none".to_string(),
        }
    }
}

impl From<Option<Owner>> for OwnerKeys {
    fn from(owner: Option<Owner>) -> Self {
        let mut keys = OwnerKeys::default();
        match owner {
            Some(Owner::Person(id)) => keys.person_id = Some(id),
            Some(Owner::Company(id)) => keys.company_id = Some(id),
            Some(Owner::Client(id)) => keys.client_id = Some(id),
            Some(Owner::Property(id)) => keys.property_id = Some(id),
            None => {}
        }
        keys
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&OwnerKeys::from(Some(*self)).owner_key())
    }
}

/// A client's persons (primary first, then oldest first) and company.
#[derive(Debug, Clone, Default)]
pub struct PartyRoster {
    pub persons: Vec<person::Model>,
    pub company: Option<company::Model>,
}

impl PartyRoster {
    pub async fn load<C>(db: &C, client_id: Uuid) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let persons = person::Entity::find()
            .filter(person::Column::ClientId.eq(client_id))
            .order_by_desc(person::Column::IsPrimary)
            .order_by_asc(person::Column::CreatedAt)
            .order_by_asc(person::Column::Id)
            .all(db)
            .await?;

        let company = company::Entity::find()
            .filter(company::Column::ClientId.eq(client_id))
            .one(db)
            .await?;

        Ok(Self { persons, company })
    }
}

pub fn resolve_owner(
    category: TargetCategory,
    context: &IntakeContext,
    roster: &PartyRoster,
) -> Result<Owner, UnresolvedReason> {
    match category {
        TargetCategory::Person => {
            if context.client_id.is_none() {
                return Err(UnresolvedReason::NoClient);
            }
            if roster.persons.is_empty() {
                return Err(UnresolvedReason::NoPersons);
            }
            let index = context.person_index.unwrap_or(0);
            roster
                .persons
                .get(index)
                .map(|p| Owner::Person(p.id))
                .ok_or(UnresolvedReason::PersonIndexOutOfRange {
                    index,
                    available: roster.persons.len(),
                })
        }
        TargetCategory::Company => {
            if context.client_id.is_none() {
                return Err(UnresolvedReason::NoClient);
            }
            roster
                .company
                .as_ref()
                .map(|c| Owner::Company(c.id))
                .ok_or(UnresolvedReason::NoCompany)
        }
        TargetCategory::Property => context
            .property_id
            .map(Owner::Property)
            .ok_or(UnresolvedReason::NoProperty),
        TargetCategory::Client => context
            .client_id
            .map(Owner::Client)
            .ok_or(UnresolvedReason::NoClient),
    }
}

/// Applies `policy` on top of [`resolve_owner`]: an out-of-range index either
/// falls back to the primary person or stays an error.
pub fn resolve_with_policy(
    category: TargetCategory,
    context: &IntakeContext,
    roster: &PartyRoster,
    policy: PersonIndexPolicy,
) -> Result<Owner, UnresolvedReason> {
    match resolve_owner(category, context, roster) {
        Err(UnresolvedReason::PersonIndexOutOfRange { index, available })
            if policy == PersonIndexPolicy::FallbackToPrimary =>
        {
            tracing::info!(
                token = %context.token,
                index,
                available,
                "Person index out of range, using primary person"
            );
            let primary = IntakeContext {
                person_index: None,
                ..context.clone()
            };
            resolve_owner(category, &primary, roster)
        }
        other => other,
    }
}
