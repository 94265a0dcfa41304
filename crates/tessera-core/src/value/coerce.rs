use crate::{
    db::record::RecordId,
    value::{Value, ValueType, compare::float_as_int},
};
use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y-%m-%d";

impl Value {
    /// Convert this value into the declared `target` type.
    ///
    /// Null converts to null for every target. Returns `None` when the value
    /// has no faithful representation in the target type.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn coerce(&self, target: ValueType) -> Option<Self> {
        if self.is_null() || target == ValueType::Any {
            return Some(self.clone());
        }

        match (target, self) {
            (ValueType::Bool, Self::Bool(_))
            | (ValueType::Int, Self::Int(_))
            | (ValueType::Float, Self::Float(_))
            | (ValueType::Text, Self::Text(_))
            | (ValueType::Date, Self::Date(_))
            | (ValueType::Blob, Self::Blob(_))
            | (ValueType::Link, Self::Link(_))
            | (ValueType::List, Self::List(_))
            | (ValueType::Map, Self::Map(_)) => Some(self.clone()),

            (ValueType::Bool, Self::Text(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },

            (ValueType::Int, Self::Float(f)) => float_as_int(*f).map(Self::Int),
            (ValueType::Int, Self::Text(s)) => s.trim().parse().ok().map(Self::Int),

            (ValueType::Float, Self::Int(i)) => Some(Self::Float(*i as f64)),
            (ValueType::Float, Self::Text(s)) => s.trim().parse().ok().map(Self::Float),

            (ValueType::Text, Self::Bool(_) | Self::Int(_) | Self::Float(_)) => {
                Some(Self::Text(self.plain_text()))
            }
            (ValueType::Text, Self::Date(d)) => Some(Self::Text(d.format(DATE_FORMAT).to_string())),
            (ValueType::Text, Self::Link(rid)) => Some(Self::Text(rid.to_string())),

            (ValueType::Date, Self::Text(s)) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .ok()
                .map(Self::Date),

            (ValueType::Link, Self::Text(s)) => s.trim().parse::<RecordId>().ok().map(Self::Link),

            (ValueType::List, scalar) => Some(Self::List(vec![scalar.clone()])),

            _ => None,
        }
    }

    // Text rendering without the quoting used by Display.
    fn plain_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
