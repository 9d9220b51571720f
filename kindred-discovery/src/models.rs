use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::schema::{interactions, likes, matches, messages, users};

// --- Enums stored as text ---

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("unknown {}: {s}", stringify!($name).to_lowercase())),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                raw.parse().map_err(Into::into)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

text_enum!(Gender { Male => "male", Female => "female", Other => "other" });

/// What a viewer last did to a target profile. Any action marks the target as seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Like,
    Skip,
}

text_enum!(Action { View => "view", Like => "like", Skip => "skip" });

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }
}

// --- User ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub age: Option<i32>,
    pub bio: String,
    pub personality: String,
    pub motivation: String,
    pub frustration: String,
    pub tags: Vec<String>,
    pub gender: Option<Gender>,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(rename = "profile_picture")]
    pub profile_picture_url: String,
    pub profile_picture_public_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

#[derive(Debug, AsChangeset, Deserialize, Validate, Default, Clone)]
#[diesel(table_name = users)]
pub struct UpdateProfile {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(range(min = 18, max = 120))]
    pub age: Option<i32>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
    #[validate(length(max = 2000))]
    pub personality: Option<String>,
    #[validate(length(max = 2000))]
    pub motivation: Option<String>,
    #[validate(length(max = 2000))]
    pub frustration: Option<String>,
    #[validate(length(max = 30))]
    pub tags: Option<Vec<String>>,
    pub gender: Option<Gender>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[serde(rename = "profile_picture")]
    #[validate(url)]
    pub profile_picture_url: Option<String>,
    pub profile_picture_public_id: Option<String>,
}

/// Public projection shown in feeds and like lists. Never carries email or password hash.
#[derive(Debug, Queryable, QueryableByName, Serialize, Deserialize, Clone, PartialEq)]
#[diesel(table_name = users)]
pub struct ProfileCard {
    pub id: Uuid,
    pub name: String,
    pub age: Option<i32>,
    pub bio: String,
    pub personality: String,
    pub tags: Vec<String>,
    pub gender: Option<Gender>,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(rename = "profile_picture")]
    pub profile_picture_url: String,
}

impl ProfileCard {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }
}

impl From<&User> for ProfileCard {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            age: user.age,
            bio: user.bio.clone(),
            personality: user.personality.clone(),
            tags: user.tags.clone(),
            gender: user.gender,
            longitude: user.longitude,
            latitude: user.latitude,
            profile_picture_url: user.profile_picture_url.clone(),
        }
    }
}

/// Minimal partner projection attached to a match listing.
#[derive(Debug, Queryable, Serialize, Deserialize, Clone, PartialEq)]
pub struct MatchPartner {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "profile_picture")]
    pub profile_picture_url: String,
    pub age: Option<i32>,
}

impl From<&User> for MatchPartner {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            profile_picture_url: user.profile_picture_url.clone(),
            age: user.age,
        }
    }
}

// --- Interaction ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = interactions)]
pub struct InteractionRecord {
    pub id: Uuid,
    pub viewer_id: Uuid,
    pub target_id: Uuid,
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = interactions)]
pub struct NewInteraction {
    pub viewer_id: Uuid,
    pub target_id: Uuid,
    pub action: Action,
}

// --- Like ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = likes)]
pub struct LikeEdge {
    pub id: Uuid,
    pub liker_id: Uuid,
    pub liked_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = likes)]
pub struct NewLike {
    pub liker_id: Uuid,
    pub liked_id: Uuid,
}

// --- Match ---

#[derive(Debug, Queryable, Identifiable, Serialize, Deserialize, Clone, PartialEq)]
#[diesel(table_name = matches)]
pub struct MatchEdge {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub matched_at: DateTime<Utc>,
}

impl MatchEdge {
    pub fn partner_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user_a == user_id {
            Some(self.user_b)
        } else if self.user_b == user_id {
            Some(self.user_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = matches)]
pub struct NewMatch {
    pub user_a: Uuid,
    pub user_b: Uuid,
}

// --- Message ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub text: String,
}
