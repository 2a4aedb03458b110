use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by every directory entity.
///
/// Deletion through the API is always a soft toggle to `Inactive`; records
/// are never physically removed. Public read paths only surface `Active`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn is_active(self) -> bool {
        matches!(self, Status::Active)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct City {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

/// Neighborhood of a city. Names are stored lowercase; the (name, city)
/// pair is unique among active records.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Neighborhood {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub city: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubCategory {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub icon: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Address {
    pub street: Option<String>,
    pub number: Option<String>,
    pub city: String,
    pub neighborhood: String,
}

/// Social/contact links of a business. All optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SocialLinks {
    pub instagram: Option<String>,
    pub facebook: Option<String>,
    pub linkedin: Option<String>,
    pub twitter: Option<String>,
    pub tiktok: Option<String>,
    pub site: Option<String>,
    pub video: Option<String>,
}

/// Business listing. `categories` and `sub_categories` are arrays of
/// references; filtering uses membership semantics.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Business {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub phone: String,
    pub whatsapp: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub social: SocialLinks,
    pub address: Address,
    pub lat: Option<String>,
    pub long: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sub_categories: Vec<String>,
    pub owner: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Bookmark linking a user to a business. At most one per (user, business)
/// pair; removal is keyed by the business id.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Favorite {
    pub id: String,
    pub user: String,
    pub business: String,
    pub created_at: DateTime<Utc>,
}

/// Public projection of a user (never carries the password hash).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// JWT claims carried by authenticated requests.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // user id
    pub role: Role,
    pub exp: usize,
}

// --- Populated (joined) views returned by read endpoints ---

#[derive(Serialize, Debug, Clone)]
pub struct AddressView {
    pub street: Option<String>,
    pub number: Option<String>,
    pub city: Option<City>,
    pub neighborhood: Option<Neighborhood>,
}

/// Business with its references resolved into full documents.
#[derive(Serialize, Debug, Clone)]
pub struct BusinessView {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub phone: String,
    pub whatsapp: Option<String>,
    pub photos: Vec<String>,
    pub social: SocialLinks,
    pub address: AddressView,
    pub lat: Option<String>,
    pub long: Option<String>,
    pub categories: Vec<Category>,
    #[serde(rename = "subCategories")]
    pub sub_categories: Vec<SubCategory>,
    pub owner: Option<PublicUser>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

/// City ranked by number of active businesses (popular-cities aggregation).
#[derive(Serialize, Debug, Clone)]
pub struct PopularCity {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    #[serde(rename = "totalBusinesses")]
    pub total_businesses: u64,
}
