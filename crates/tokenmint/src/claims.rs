//! Claims mapping between principals and token payloads
//!
//! A [`ClaimMap`] is an ordered list of `(claim name, attribute descriptor)`
//! pairs. The [`ClaimsMapper`] walks it in both directions:
//!
//! - [`ClaimsMapper::to_claims`] reads attributes off a principal to build the
//!   claims embedded in a new token
//! - [`ClaimsMapper::apply_claims`] writes the claims of a verified token back
//!   onto a principal-shaped object
//!
//! An attribute descriptor is either a plain field lookup or a computed claim:
//!
//! ```rust
//! use tokenmint::claims::{AttributeValue, ClaimMap};
//!
//! let map = ClaimMap::new()
//!     .field("user_id", "id")
//!     .field("username", "username")
//!     .computed("display", |principal| {
//!         principal.attribute("username").unwrap_or(AttributeValue::Null)
//!     });
//! assert_eq!(map.len(), 3);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::encoder::ClaimEncoder;
use crate::error::{Result, TokenError};

/// JSON value of a single claim
pub type ClaimValue = Value;

/// Ordered claim name → claim value mapping
pub type TokenClaims = Map<String, Value>;

/// Scalar value of a principal attribute, before claim encoding
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Unset attribute
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
    /// UUID, encoded textually
    Uuid(Uuid),
    /// Timezone-aware instant, encoded textually
    DateTime(DateTime<Utc>),
    /// Naive local datetime, encoded textually
    NaiveDateTime(NaiveDateTime),
    /// Calendar date, encoded textually
    Date(NaiveDate),
}

impl AttributeValue {
    /// Interpret a decoded claim value as an attribute value
    ///
    /// Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for AttributeValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl From<NaiveDateTime> for AttributeValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::NaiveDateTime(value)
    }
}

impl From<NaiveDate> for AttributeValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An authenticated entity whose attributes populate claims
///
/// The crate never looks principals up itself; the caller hands in an
/// already-authenticated principal.
pub trait Principal {
    /// Value of attribute `name`, or `None` if the principal has no such attribute
    fn attribute(&self, name: &str) -> Option<AttributeValue>;

    /// Store a decoded claim value under attribute `name`
    fn set_attribute(&mut self, name: &str, value: ClaimValue);
}

/// Dynamic principals: a JSON object keyed by attribute name
impl Principal for Map<String, Value> {
    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.get(name).map(AttributeValue::from_json)
    }

    fn set_attribute(&mut self, name: &str, value: ClaimValue) {
        self.insert(name.to_string(), value);
    }
}

/// Attribute bag for principals known only by their claims
///
/// Typically attached to the request context after bearer authentication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimsPrincipal {
    attributes: HashMap<String, ClaimValue>,
}

impl ClaimsPrincipal {
    /// Empty (anonymous) principal
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw claim value stored under `name`
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.attributes.get(name)
    }

    /// Whether any claim has been applied
    pub fn is_anonymous(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl Principal for ClaimsPrincipal {
    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.attributes.get(name).map(AttributeValue::from_json)
    }

    fn set_attribute(&mut self, name: &str, value: ClaimValue) {
        self.attributes.insert(name.to_string(), value);
    }
}

/// Function computing a claim from the whole principal
pub type ComputeFn = Arc<dyn Fn(&dyn Principal) -> AttributeValue + Send + Sync>;

/// How a claim obtains its value from a principal
#[derive(Clone)]
pub enum AttributeDescriptor {
    /// Read the named attribute
    FieldLookup(String),
    /// Call a caller-supplied function of the principal
    ComputedClaim(ComputeFn),
}

impl AttributeDescriptor {
    /// Evaluate against `principal`; a missing attribute yields `Null`
    pub fn resolve(&self, principal: &dyn Principal) -> AttributeValue {
        match self {
            Self::FieldLookup(name) => principal.attribute(name).unwrap_or(AttributeValue::Null),
            Self::ComputedClaim(compute) => compute(principal),
        }
    }

    /// Attribute a decoded claim is written back to
    ///
    /// Computed claims have no backing field, so they are applied under the
    /// claim's own name.
    pub fn target_attribute<'a>(&'a self, claim: &'a str) -> &'a str {
        match self {
            Self::FieldLookup(name) => name,
            Self::ComputedClaim(_) => claim,
        }
    }
}

impl fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldLookup(name) => f.debug_tuple("FieldLookup").field(name).finish(),
            Self::ComputedClaim(_) => f.write_str("ComputedClaim(<fn>)"),
        }
    }
}

impl From<&str> for AttributeDescriptor {
    fn from(name: &str) -> Self {
        Self::FieldLookup(name.to_string())
    }
}

/// Ordered claim → attribute configuration
#[derive(Debug, Clone, Default)]
pub struct ClaimMap {
    entries: Vec<(String, AttributeDescriptor)>,
}

impl ClaimMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock map: `user_id → id`, `username → username`, `last_login → last_login`
    pub fn standard() -> Self {
        Self::new()
            .field("user_id", "id")
            .field("username", "username")
            .field("last_login", "last_login")
    }

    /// Add (or replace) a field-lookup claim
    pub fn field(self, claim: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.with(claim, AttributeDescriptor::FieldLookup(attribute.into()))
    }

    /// Add (or replace) a computed claim
    pub fn computed<F>(self, claim: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&dyn Principal) -> AttributeValue + Send + Sync + 'static,
    {
        self.with(claim, AttributeDescriptor::ComputedClaim(Arc::new(compute)))
    }

    /// Add (or replace) a claim with an explicit descriptor
    pub fn with(mut self, claim: impl Into<String>, descriptor: AttributeDescriptor) -> Self {
        let claim = claim.into();
        match self.entries.iter_mut().find(|(name, _)| *name == claim) {
            Some(entry) => entry.1 = descriptor,
            None => self.entries.push((claim, descriptor)),
        }
        self
    }

    /// Iterate `(claim, descriptor)` pairs in configuration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeDescriptor)> {
        self.entries.iter().map(|(claim, d)| (claim.as_str(), d))
    }

    /// Claim names in configuration order
    pub fn claim_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(claim, _)| claim.as_str())
    }

    /// Number of configured claims
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no claims are configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Into<String>, A: Into<String>> FromIterator<(C, A)> for ClaimMap {
    fn from_iter<I: IntoIterator<Item = (C, A)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (claim, attribute)| map.field(claim, attribute))
    }
}

/// Converts between principals and token claims
#[derive(Debug, Clone)]
pub struct ClaimsMapper {
    map: ClaimMap,
    encoder: Arc<dyn ClaimEncoder>,
}

impl ClaimsMapper {
    /// Mapper over `map`, encoding attribute values with `encoder`
    pub fn new(map: ClaimMap, encoder: Arc<dyn ClaimEncoder>) -> Self {
        Self { map, encoder }
    }

    /// The claim configuration in use
    pub fn claim_map(&self) -> &ClaimMap {
        &self.map
    }

    /// Build the claims for `principal`
    ///
    /// Attributes the principal does not have resolve to `null`; issuance never
    /// fails because an optional profile field is unset.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Encoding`] if the encoder cannot represent a value
    /// (for example a non-finite float).
    pub fn to_claims<P: Principal + ?Sized>(&self, principal: &P) -> Result<TokenClaims> {
        let principal = DynPrincipal(principal);
        let mut claims = TokenClaims::new();
        for (claim, descriptor) in self.map.iter() {
            let value = descriptor.resolve(&principal);
            let encoded =
                self.encoder
                    .encode(claim, &value)
                    .map_err(|reason| TokenError::Encoding {
                        claim: claim.to_string(),
                        reason,
                    })?;
            claims.insert(claim.to_string(), encoded);
        }
        Ok(claims)
    }

    /// Copy mapped claims from `claims` onto `principal`
    ///
    /// Only claims present both in the map and in `claims` are applied; other
    /// attributes are left untouched.
    pub fn apply_claims<P: Principal + ?Sized>(&self, principal: &mut P, claims: &TokenClaims) {
        for (claim, descriptor) in self.map.iter() {
            if let Some(value) = claims.get(claim) {
                principal.set_attribute(descriptor.target_attribute(claim), value.clone());
            }
        }
    }

    /// Pick the mapped claims out of a decoded payload, `null` for absent ones
    pub fn select_claims(&self, payload: &TokenClaims) -> TokenClaims {
        self.map
            .claim_names()
            .map(|claim| {
                let value = payload.get(claim).cloned().unwrap_or(Value::Null);
                (claim.to_string(), value)
            })
            .collect()
    }
}

/// Adapter letting unsized principals be passed to computed claims as `&dyn Principal`
struct DynPrincipal<'a, P: Principal + ?Sized>(&'a P);

impl<P: Principal + ?Sized> Principal for DynPrincipal<'_, P> {
    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.0.attribute(name)
    }

    fn set_attribute(&mut self, _name: &str, _value: ClaimValue) {}
}
