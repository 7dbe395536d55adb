//! Random value generators.

use crate::mock::RandomKind;
use fake::faker::address::en::{CityName, CountryName};
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::Word;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::distributions::Alphanumeric;
use rand::Rng;

pub const DEFAULT_ALPHANUMERIC_LENGTH: usize = 16;
const DEFAULT_INT_MAX: i64 = 1_000_000;

/// Shape of a generated value, validated at load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RandomShape {
    Alphanumeric(usize),
    Uuid,
    Int { min: i64, max: i64 },
    Boolean,
    FirstName,
    LastName,
    FullName,
    Email,
    City,
    Country,
    Phone,
    Word,
}

impl RandomShape {
    pub fn compile(
        kind: RandomKind,
        length: Option<usize>,
        min: Option<i64>,
        max: Option<i64>,
    ) -> Result<Self, String> {
        Ok(match kind {
            RandomKind::Alphanumeric => {
                let length = length.unwrap_or(DEFAULT_ALPHANUMERIC_LENGTH);
                if length == 0 {
                    return Err("alphanumeric length must be at least 1".to_string());
                }
                RandomShape::Alphanumeric(length)
            }
            RandomKind::Uuid => RandomShape::Uuid,
            RandomKind::Int => {
                let min = min.unwrap_or(0);
                let max = max.unwrap_or(DEFAULT_INT_MAX);
                if min > max {
                    return Err(format!("int range is empty: min {min} > max {max}"));
                }
                RandomShape::Int { min, max }
            }
            RandomKind::Boolean => RandomShape::Boolean,
            RandomKind::FirstName => RandomShape::FirstName,
            RandomKind::LastName => RandomShape::LastName,
            RandomKind::FullName => RandomShape::FullName,
            RandomKind::Email => RandomShape::Email,
            RandomKind::City => RandomShape::City,
            RandomKind::Country => RandomShape::Country,
            RandomKind::Phone => RandomShape::Phone,
            RandomKind::Word => RandomShape::Word,
        })
    }

    /// Parse the `alfred.random.<Kind>` inline form
    pub fn from_inline(kind: &str) -> Result<Self, String> {
        if let Some(args) = kind
            .strip_prefix("RandomIntBetween(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let (min, max) = args
                .split_once(',')
                .ok_or_else(|| format!("RandomIntBetween expects two bounds, got '{args}'"))?;
            let min: i64 = min
                .trim()
                .parse()
                .map_err(|_| format!("invalid lower bound '{}'", min.trim()))?;
            let max: i64 = max
                .trim()
                .parse()
                .map_err(|_| format!("invalid upper bound '{}'", max.trim()))?;
            return Self::compile(RandomKind::Int, None, Some(min), Some(max));
        }

        let shape = match kind {
            "RandomUUID" => RandomShape::Uuid,
            "RandomAlphanumeric" => RandomShape::Alphanumeric(DEFAULT_ALPHANUMERIC_LENGTH),
            "RandomInt" => RandomShape::Int {
                min: 0,
                max: DEFAULT_INT_MAX,
            },
            "RandomBoolean" => RandomShape::Boolean,
            "RandomPersonFirstName" => RandomShape::FirstName,
            "RandomPersonLastName" => RandomShape::LastName,
            "RandomPersonFullName" => RandomShape::FullName,
            "RandomEmail" => RandomShape::Email,
            "RandomAddressCity" => RandomShape::City,
            "RandomAddressCountry" => RandomShape::Country,
            "RandomPhoneNumber" => RandomShape::Phone,
            "RandomWord" => RandomShape::Word,
            other => return Err(format!("unknown random kind '{other}'")),
        };
        Ok(shape)
    }

    pub fn generate(&self) -> String {
        match self {
            RandomShape::Alphanumeric(length) => rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(*length)
                .map(char::from)
                .collect(),
            RandomShape::Uuid => uuid::Uuid::new_v4().to_string(),
            RandomShape::Int { min, max } => rand::thread_rng().gen_range(*min..=*max).to_string(),
            RandomShape::Boolean => rand::thread_rng().gen_bool(0.5).to_string(),
            RandomShape::FirstName => FirstName().fake(),
            RandomShape::LastName => LastName().fake(),
            RandomShape::FullName => Name().fake(),
            RandomShape::Email => SafeEmail().fake(),
            RandomShape::City => CityName().fake(),
            RandomShape::Country => CountryName().fake(),
            RandomShape::Phone => PhoneNumber().fake(),
            RandomShape::Word => Word().fake(),
        }
    }
}
