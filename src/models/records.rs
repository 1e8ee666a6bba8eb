// Dashboard record types, mirroring the provider's tables

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================================================================================================
// Enumerations
// ==================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffType {
    Creative,
    Administrative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Planning,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertFormat {
    Video,
    Print,
    Digital,
    Social,
    Billboard,
    Radio,
}

impl AdvertFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdvertFormat::Video => "video",
            AdvertFormat::Print => "print",
            AdvertFormat::Digital => "digital",
            AdvertFormat::Social => "social",
            AdvertFormat::Billboard => "billboard",
            AdvertFormat::Radio => "radio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Concept,
    InProduction,
    Review,
    Approved,
    Completed,
}

// ==================================================================================================
// Records
// ==================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffGrade {
    pub id: Uuid,
    pub name: String,
    pub pay_rate: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub staff_type: StaffType,
    pub grade_id: Option<Uuid>,
    pub hire_date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub staff_contact_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub description: String,
    pub budget: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: CampaignStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advert {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub title: String,
    pub description: String,
    pub format: AdvertFormat,
    pub production_status: ProductionStatus,
    pub production_notes: String,
    pub cost: f64,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNote {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub content: String,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
