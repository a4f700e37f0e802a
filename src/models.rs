use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sqlx::FromRow;
use std::{collections::BTreeSet, fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::{AppError, Result};

/// Upper bound shared by every free-text column.
pub const MAX_TEXT_LEN: usize = 255;

// --- Security Schemas ---

/// Role
///
/// A permission grant attached to an Account. There is no hierarchy between roles:
/// an administrator account carries both USER and ADMIN explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(AppError::validation(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account
///
/// A login identity stored in the `accounts` table, with its roles loaded from `account_roles`.
/// The bcrypt hash never leaves the process: it is skipped by serde, ts-rs and `Debug`.
#[derive(Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct Account {
    pub id: i64,
    pub user_name: String,
    #[serde(skip_serializing)]
    #[ts(skip)]
    #[schema(ignore)]
    pub password_hash: String,
    #[schema(value_type = Vec<Role>)]
    pub roles: BTreeSet<Role>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("user_name", &self.user_name)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

// --- Catalog Schemas ---

/// Currency
///
/// Currencies a price can be quoted in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Currency {
    Cad,
    Eur,
    #[default]
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Cad => "CAD",
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
        }
    }
}

impl FromStr for Currency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CAD" => Ok(Currency::Cad),
            "EUR" => Ok(Currency::Eur),
            "USD" => Ok(Currency::Usd),
            other => Err(AppError::validation(format!("unknown currency '{other}'"))),
        }
    }
}

/// Amount
///
/// An exact decimal amount held as integer minor units (cents).
/// Parsing rejects more than two fractional digits; the sign is checked by `Money::validate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(i64);

impl Amount {
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl FromStr for Amount {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::validation(format!("'{s}' is not a decimal amount"));
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 {
            return Err(AppError::validation(format!(
                "amount '{s}' has more than 2 fractional digits"
            )));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let fraction: i64 = format!("{fraction:0<2}").parse().map_err(|_| invalid())?;
        let cents = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(invalid)?;

        Ok(Amount(if negative { -cents } else { cents }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal number or a decimal string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Amount, E> {
                v.checked_mul(100)
                    .map(Amount)
                    .ok_or_else(|| E::custom("amount out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
                i64::try_from(v)
                    .map_err(|_| E::custom("amount out of range"))
                    .and_then(|v| self.visit_i64(v))
            }

            // Display for f64 yields the shortest round-tripping form, so 45.83 stays "45.83".
            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Amount, E> {
                if !v.is_finite() {
                    return Err(E::custom("amount must be finite"));
                }
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Money
///
/// A price: currency plus strictly positive amount with at most two fractional digits.
/// The currency defaults to USD when omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Money {
    #[serde(default)]
    pub currency: Currency,
    #[ts(type = "number")]
    #[schema(value_type = f64, example = 45.83)]
    pub amount: Amount,
}

impl Money {
    pub fn new(currency: Currency, amount: Amount) -> Self {
        Self { currency, amount }
    }

    pub fn usd(cents: i64) -> Self {
        Self::new(Currency::Usd, Amount::from_cents(cents))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(AppError::validation(format!(
                "price amount must be greater than 0, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Author
///
/// A row of the `authors` table. The books written by an author are reachable through
/// `GET /authors/{id}/books` rather than embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Author {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

/// Book
///
/// A catalog entry with its price and the authors linked through `book_authors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub published_date: NaiveDate,
    pub price: Money,
    pub authors: Vec<Author>,
}

// --- Request Payloads (Input Schemas) ---

/// AuthorRequest
///
/// Full author payload used by POST /authors and PUT /authors/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthorRequest {
    pub first_name: String,
    pub last_name: String,
}

impl AuthorRequest {
    pub fn validate(&self) -> Result<()> {
        check_text("first_name", &self.first_name)?;
        check_text("last_name", &self.last_name)
    }
}

/// AuthorPatch
///
/// Partial update for PATCH /authors/{id}; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AuthorPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl AuthorPatch {
    pub fn apply(self, current: Author) -> AuthorRequest {
        AuthorRequest {
            first_name: self.first_name.unwrap_or(current.first_name),
            last_name: self.last_name.unwrap_or(current.last_name),
        }
    }
}

/// BookRequest
///
/// Full book payload used by POST /books and PUT /books/{id}.
/// `authors` holds author ids; at least one is required and each must exist.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookRequest {
    pub title: String,
    pub description: String,
    pub published_date: NaiveDate,
    pub price: Money,
    pub authors: Vec<i64>,
}

impl BookRequest {
    pub fn validate(&self) -> Result<()> {
        check_text("title", &self.title)?;
        check_text("description", &self.description)?;
        self.price.validate()?;
        if self.authors.is_empty() {
            return Err(AppError::validation("a book must have at least one author"));
        }
        Ok(())
    }

    /// Author ids without duplicates, in first-seen order.
    pub fn author_ids(&self) -> Vec<i64> {
        let mut seen = BTreeSet::new();
        self.authors
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// BookPatch
///
/// Partial update for PATCH /books/{id}.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<i64>>,
}

impl BookPatch {
    pub fn apply(self, current: Book) -> BookRequest {
        BookRequest {
            title: self.title.unwrap_or(current.title),
            description: self.description.unwrap_or(current.description),
            published_date: self.published_date.unwrap_or(current.published_date),
            price: self.price.unwrap_or(current.price),
            authors: self
                .authors
                .unwrap_or_else(|| current.authors.iter().map(|a| a.id).collect()),
        }
    }
}

/// AccountRequest
///
/// Full account payload used by POST /accounts and PUT /accounts/{id}.
/// The plaintext password is hashed by the service before it reaches the store.
/// An empty role set defaults to {USER}.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountRequest {
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    #[schema(value_type = Vec<Role>)]
    pub roles: BTreeSet<Role>,
}

impl AccountRequest {
    pub fn validate(&self) -> Result<()> {
        check_text("user_name", &self.user_name)?;
        check_text("password", &self.password)
    }

    pub fn effective_roles(&self) -> BTreeSet<Role> {
        if self.roles.is_empty() {
            BTreeSet::from([Role::User])
        } else {
            self.roles.clone()
        }
    }
}

impl fmt::Debug for AccountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountRequest")
            .field("user_name", &self.user_name)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// AccountPatch
///
/// Partial update for PATCH /accounts/{id}. A password, when present, is re-hashed.
#[derive(Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AccountPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Role>>)]
    pub roles: Option<BTreeSet<Role>>,
}

/// check_text
///
/// Enforces the 1..=255 character bound on a text field.
pub fn check_text(field: &str, value: &str) -> Result<()> {
    let len = value.chars().count();
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    if len > MAX_TEXT_LEN {
        return Err(AppError::validation(format!(
            "{field} must be at most {MAX_TEXT_LEN} characters, got {len}"
        )));
    }
    Ok(())
}
