use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::query::{Field, FieldKind};
use crate::resources::{Input, Resource, Violations};

pub const DIFFICULTIES: &[&str] = &["easy", "medium", "difficult"];
pub const DEFAULT_RATING: f64 = 4.5;

const NAME_MIN: usize = 10;
const NAME_MAX: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tour_difficulty", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Difficult => "difficult",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub ratings_average: f64,
    pub ratings_quantity: i32,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    pub images: Vec<String>,
    #[serde(with = "rfc3339_list")]
    pub start_dates: Vec<OffsetDateTime>,
    pub secret_tour: bool,
    pub guides: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Lowercase, ASCII-alphanumeric words joined by dashes.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Round to one decimal place (4.666 -> 4.7).
pub fn round_rating(avg: f64) -> f64 {
    (avg * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourInput {
    pub name: String,
    pub duration: i32,
    pub max_group_size: i32,
    pub difficulty: Difficulty,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    pub image_cover: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, with = "rfc3339_list")]
    pub start_dates: Vec<OffsetDateTime>,
    #[serde(default)]
    pub secret_tour: bool,
    #[serde(default)]
    pub guides: Vec<Uuid>,
}

impl Input for TourInput {
    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        self.summary = self.summary.trim().to_string();
        if let Some(d) = self.description.as_mut() {
            *d = d.trim().to_string();
        }
    }

    fn validate(&self, v: &mut Violations) {
        check_name(&self.name, v);
        v.check(self.duration > 0, "A tour must have a positive duration");
        v.check(self.max_group_size > 0, "A tour must have a positive group size");
        v.check(self.price > 0.0, "A tour must have a positive price");
        if let Some(discount) = self.price_discount {
            v.check(
                discount < self.price,
                "Discount price should be below the regular price",
            );
        }
        v.check(!self.summary.is_empty(), "A tour must have a summary");
        v.check(!self.image_cover.is_empty(), "A tour must have an imageCover");
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourPatch {
    pub name: Option<String>,
    pub duration: Option<i32>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<Difficulty>,
    pub price: Option<f64>,
    pub price_discount: Option<f64>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub image_cover: Option<String>,
    pub images: Option<Vec<String>>,
    #[serde(default, with = "rfc3339_list::option")]
    pub start_dates: Option<Vec<OffsetDateTime>>,
    pub secret_tour: Option<bool>,
    pub guides: Option<Vec<Uuid>>,
}

impl Input for TourPatch {
    fn normalize(&mut self) {
        for text in [&mut self.name, &mut self.summary, &mut self.description]
            .into_iter()
            .flatten()
        {
            *text = text.trim().to_string();
        }
    }

    fn validate(&self, v: &mut Violations) {
        if let Some(name) = &self.name {
            check_name(name, v);
        }
        if let Some(duration) = self.duration {
            v.check(duration > 0, "A tour must have a positive duration");
        }
        if let Some(size) = self.max_group_size {
            v.check(size > 0, "A tour must have a positive group size");
        }
        if let Some(price) = self.price {
            v.check(price > 0.0, "A tour must have a positive price");
        }
        if let (Some(discount), Some(price)) = (self.price_discount, self.price) {
            v.check(
                discount < price,
                "Discount price should be below the regular price",
            );
        }
        if let Some(summary) = &self.summary {
            v.check(!summary.is_empty(), "A tour must have a summary");
        }
    }
}

fn check_name(name: &str, v: &mut Violations) {
    let len = name.chars().count();
    v.check(
        len >= NAME_MIN,
        "A tour name must have more or equal than 10 characters",
    );
    v.check(
        len <= NAME_MAX,
        "A tour name must have less or equal than 40 characters",
    );
}

pub static TOUR_FIELDS: &[Field] = &[
    Field::new("id", "id", FieldKind::Uuid),
    Field::new("name", "name", FieldKind::Text),
    Field::new("slug", "slug", FieldKind::Text),
    Field::new("duration", "duration", FieldKind::Integer),
    Field::new("maxGroupSize", "max_group_size", FieldKind::Integer),
    Field::new("difficulty", "difficulty", FieldKind::Choice(DIFFICULTIES)),
    Field::new("ratingsAverage", "ratings_average", FieldKind::Number),
    Field::new("ratingsQuantity", "ratings_quantity", FieldKind::Integer),
    Field::new("price", "price", FieldKind::Number),
    Field::new("priceDiscount", "price_discount", FieldKind::Number),
    Field::new("summary", "summary", FieldKind::Text),
    Field::new("description", "description", FieldKind::Text),
    Field::new("imageCover", "image_cover", FieldKind::Text),
    Field::new("images", "images", FieldKind::List),
    Field::new("startDates", "start_dates", FieldKind::List),
    Field::new("guides", "guides", FieldKind::List),
    Field::new("createdAt", "created_at", FieldKind::Timestamp),
];

impl Resource for Tour {
    type Create = TourInput;
    type Patch = TourPatch;

    const NAME: &'static str = "tour";
    const FIELDS: &'static [Field] = TOUR_FIELDS;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// RFC 3339 (de)serialization for lists of timestamps.
mod rfc3339_list {
    use serde::{de, ser::SerializeSeq, Deserialize, Deserializer, Serializer};
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};

    pub fn serialize<S: Serializer>(dates: &[OffsetDateTime], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(dates.len()))?;
        for date in dates {
            let text = date.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
            seq.serialize_element(&text)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<OffsetDateTime>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|raw| OffsetDateTime::parse(raw, &Rfc3339).map_err(de::Error::custom))
            .collect()
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<Vec<OffsetDateTime>>, D::Error> {
            Option::<Vec<String>>::deserialize(d)?
                .map(|raw| {
                    raw.iter()
                        .map(|r| OffsetDateTime::parse(r, &Rfc3339).map_err(de::Error::custom))
                        .collect()
                })
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> TourInput {
        serde_json::from_value(json!({
            "name": "  The Forest Hiker  ",
            "duration": 5,
            "maxGroupSize": 25,
            "difficulty": "easy",
            "price": 397.0,
            "summary": " Breathtaking hike ",
            "imageCover": "tour-1-cover.jpg",
            "startDates": ["2021-04-25T09:00:00Z", "2021-07-20T09:00:00Z"]
        }))
        .unwrap()
    }

    #[test]
    fn slug_is_lowercase_and_dashed() {
        assert_eq!(slugify("The Forest Hiker"), "the-forest-hiker");
        assert_eq!(slugify("  Sea  & Sun!! 2 "), "sea-sun-2");
    }

    #[test]
    fn ratings_round_to_one_decimal() {
        assert_eq!(round_rating(4.666), 4.7);
        assert_eq!(round_rating(4.0), 4.0);
    }

    #[test]
    fn input_is_trimmed_and_accepted() {
        let tour = input().prepare().unwrap();
        assert_eq!(tour.name, "The Forest Hiker");
        assert_eq!(tour.summary, "Breathtaking hike");
        assert_eq!(tour.start_dates.len(), 2);
        assert!(!tour.secret_tour);
    }

    #[test]
    fn input_rejects_short_names_and_bad_discounts() {
        let mut tour = input();
        tour.name = "Short".into();
        tour.price_discount = Some(500.0);
        let msg = tour.prepare().unwrap_err().to_string();
        assert!(msg.contains("more or equal than 10 characters"));
        assert!(msg.contains("below the regular price"));
    }

    #[test]
    fn unknown_difficulty_is_a_parse_error() {
        let err = serde_json::from_value::<TourPatch>(json!({ "difficulty": "extreme" }));
        assert!(err.is_err());
    }

    #[test]
    fn start_dates_serialize_as_rfc3339() {
        let patch: TourPatch =
            serde_json::from_value(json!({ "startDates": ["2021-03-01T00:00:00Z"] })).unwrap();
        let dates = patch.start_dates.unwrap();
        assert_eq!(dates[0].year(), 2021);
        assert!(serde_json::from_value::<TourPatch>(json!({ "startDates": null }))
            .unwrap()
            .start_dates
            .is_none());
    }
}
