use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use sea_orm::ActiveEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic category of an uploaded document. The string value is both the
/// wire code accepted by the upload endpoint and the stored column value.
#[derive(
    EnumIter,
    DeriveActiveEnum,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum DocumentKind {
    #[sea_orm(string_value = "PIECE_IDENTITE")]
    #[serde(rename = "PIECE_IDENTITE")]
    IdentityDocument,
    #[sea_orm(string_value = "ACTE_NAISSANCE")]
    #[serde(rename = "ACTE_NAISSANCE")]
    BirthCertificate,
    #[sea_orm(string_value = "KBIS")]
    #[serde(rename = "KBIS")]
    CompanyRegistration,
    #[sea_orm(string_value = "STATUTS")]
    #[serde(rename = "STATUTS")]
    CompanyStatutes,
    #[sea_orm(string_value = "DIAGNOSTICS")]
    #[serde(rename = "DIAGNOSTICS")]
    Diagnostics,
    #[sea_orm(string_value = "TITRE_PROPRIETE")]
    #[serde(rename = "TITRE_PROPRIETE")]
    TitleDeed,
    #[sea_orm(string_value = "REGLEMENT_COPROPRIETE")]
    #[serde(rename = "REGLEMENT_COPROPRIETE")]
    CondominiumRegulations,
    #[sea_orm(string_value = "CAHIER_DES_CHARGES_LOTISSEMENT")]
    #[serde(rename = "CAHIER_DES_CHARGES_LOTISSEMENT")]
    SubdivisionCharter,
    #[sea_orm(string_value = "STATUTS_ASSOCIATION_SYNDICALE")]
    #[serde(rename = "STATUTS_ASSOCIATION_SYNDICALE")]
    AssociationStatutes,
    #[sea_orm(string_value = "LIVRET_FAMILLE")]
    #[serde(rename = "LIVRET_FAMILLE")]
    FamilyBooklet,
    #[sea_orm(string_value = "CONTRAT_PACS")]
    #[serde(rename = "CONTRAT_PACS")]
    CivilPartnership,
    #[sea_orm(string_value = "ASSURANCE")]
    #[serde(rename = "ASSURANCE")]
    Insurance,
    #[sea_orm(string_value = "RIB")]
    #[serde(rename = "RIB")]
    BankDetails,
    #[sea_orm(string_value = "JUSTIFICATIF_DOMICILE")]
    #[serde(rename = "JUSTIFICATIF_DOMICILE")]
    ProofOfAddress,
    #[sea_orm(string_value = "AVIS_IMPOSITION")]
    #[serde(rename = "AVIS_IMPOSITION")]
    TaxNotice,
    #[sea_orm(string_value = "BULLETIN_SALAIRE")]
    #[serde(rename = "BULLETIN_SALAIRE")]
    Payslip,
    #[sea_orm(string_value = "AUTRE")]
    #[serde(rename = "AUTRE")]
    Other,
}

impl DocumentKind {
    /// Wire/database code, e.g. `KBIS`.
    pub fn code(&self) -> String {
        self.to_value()
    }

    /// Label stored on the document row and shown to the notary.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentKind::IdentityDocument => "Pièce d'identité",
            DocumentKind::BirthCertificate => "Acte de naissance",
            DocumentKind::CompanyRegistration => "Extrait Kbis",
            DocumentKind::CompanyStatutes => "Statuts de la société",
            DocumentKind::Diagnostics => "Dossier de diagnostics techniques",
            DocumentKind::TitleDeed => "Titre de propriété",
            DocumentKind::CondominiumRegulations => "Règlement de copropriété",
            DocumentKind::SubdivisionCharter => "Cahier des charges du lotissement",
            DocumentKind::AssociationStatutes => "Statuts de l'association syndicale",
            DocumentKind::FamilyBooklet => "Livret de famille",
            DocumentKind::CivilPartnership => "Contrat de PACS",
            DocumentKind::Insurance => "Attestation d'assurance",
            DocumentKind::BankDetails => "RIB",
            DocumentKind::ProofOfAddress => "Justificatif de domicile",
            DocumentKind::TaxNotice => "Avis d'imposition",
            DocumentKind::Payslip => "Bulletin de salaire",
            DocumentKind::Other => "Autre document",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown document kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for DocumentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        Self::try_from_value(&code).map_err(|_| UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!("KBIS".parse::<DocumentKind>(), Ok(DocumentKind::CompanyRegistration));
        assert_eq!(" diagnostics ".parse::<DocumentKind>(), Ok(DocumentKind::Diagnostics));
        assert_eq!(
            "PIECE_IDENTITE".parse::<DocumentKind>(),
            Ok(DocumentKind::IdentityDocument)
        );
    }

    #[test]
    fn rejects_unknown_codes() {
        let err = "PASSEPORT_GALACTIQUE".parse::<DocumentKind>().unwrap_err();
        assert_eq!(err, UnknownKind("PASSEPORT_GALACTIQUE".to_string()));
    }

    #[test]
    fn serde_uses_the_stored_code() {
        for kind in DocumentKind::iter() {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.code()));
            assert_eq!(kind.code().parse::<DocumentKind>(), Ok(kind));
        }
    }
}
