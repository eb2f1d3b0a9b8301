use crate::{
    campaign::TryParse,
    event::{resolve_property, EventProperties, Location, ABSENT, PROFILE_OLD_VALUE},
    trigger::{GeoRadius, TriggerCondition, TriggerOperator},
    value::{clean, Scalar},
    EventAdapter, TriggerAdapter, TriggerValue,
};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Matches campaign triggers against events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggersMatcher;

impl TriggersMatcher {
    /// Return `true` if any of the campaign's triggers matches the event.
    pub fn match_event(&self, triggers: &[TriggerAdapter], event: &EventAdapter) -> bool {
        triggers.iter().any(|trigger| self.match_trigger(trigger, event))
    }

    /// Return `true` if `trigger` matches the event.
    pub fn match_trigger(&self, trigger: &TriggerAdapter, event: &EventAdapter) -> bool {
        trigger.matches(event)
    }
}

impl TriggerAdapter {
    /// Return `true` if the event satisfies this trigger.
    ///
    /// Property conditions must all hold. Item conditions must all hold for at least one charged
    /// item. Geo-radius conditions, when present, require the user to be inside one of the areas.
    pub fn matches(&self, event: &EventAdapter) -> bool {
        if self.event_name() != event.event_name() {
            return false;
        }

        if let Some(attribute) = self.profile_attr_name() {
            if event.profile_attr_name() != Some(attribute) {
                return false;
            }
        }

        if self.is_first_time_only()
            && event.profile_attr_name().is_some()
            && !event.property_value(PROFILE_OLD_VALUE).is_absent()
        {
            return false;
        }

        self.matches_properties(event) && self.matches_items(event) && self.matches_geo(event)
    }

    fn matches_properties(&self, event: &EventAdapter) -> bool {
        self.property_conditions()
            .iter()
            .all(|condition| eval_condition(condition, event.properties()))
    }

    fn matches_items(&self, event: &EventAdapter) -> bool {
        let conditions = self.item_conditions();
        if conditions.is_empty() {
            return true;
        }

        event.items().iter().any(|item| {
            conditions
                .iter()
                .all(|condition| eval_condition(condition, item))
        })
    }

    fn matches_geo(&self, event: &EventAdapter) -> bool {
        if self.geo_radius().is_empty() {
            return true;
        }
        let Some(location) = event.user_location() else {
            return false;
        };

        self.geo_radius()
            .iter()
            .filter_map(|area| Option::<&GeoRadius>::from(area))
            .any(|area| area.contains(location))
    }
}

fn eval_condition(condition: &TryParse<TriggerCondition>, properties: &EventProperties) -> bool {
    match condition {
        TryParse::Parsed(condition) => condition.eval(properties),
        TryParse::ParseFailed(_) => false,
    }
}

impl TriggerCondition {
    fn eval(&self, properties: &EventProperties) -> bool {
        let Some(name) = &self.property_name else {
            return false;
        };
        let actual = resolve_property(properties, name).unwrap_or(&ABSENT);
        self.operator.eval(&self.expected, actual)
    }
}

impl GeoRadius {
    fn contains(&self, location: Location) -> bool {
        haversine_km(self.lat, self.lng, location.lat, location.lng) <= self.radius
    }
}

fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

impl TriggerOperator {
    /// Applying `TriggerOperator` to the values. Returns `false` if the operator cannot be applied
    /// to the operands (e.g., a non-numeric value compared with `LessThan`).
    ///
    /// An absent `actual` value satisfies [`TriggerOperator::NotSet`] and the negated operators
    /// ([`TriggerOperator::NotEquals`], [`TriggerOperator::NotContains`]).
    pub fn eval(&self, expected: &TriggerValue, actual: &TriggerValue) -> bool {
        self.try_eval(expected, actual).unwrap_or(false)
    }

    /// Try applying `TriggerOperator` to the values, returning `None` if the operator cannot be
    /// applied.
    fn try_eval(&self, expected: &TriggerValue, actual: &TriggerValue) -> Option<bool> {
        match self {
            Self::Set => Some(!actual.is_absent()),
            Self::NotSet => Some(actual.is_absent()),

            Self::Equals => Some(values_equal(expected, actual)),
            Self::NotEquals => Some(!values_equal(expected, actual)),

            // `expected` is the left operand: `LessThan` holds iff `expected < actual`.
            Self::LessThan | Self::GreaterThan => {
                let expected = to_number(expected)?;
                let actual = to_number(actual)?;
                Some(if *self == Self::LessThan {
                    expected < actual
                } else {
                    expected > actual
                })
            }

            Self::Between => {
                let bounds = expected
                    .list_value()?
                    .iter()
                    .map(Scalar::to_number)
                    .collect::<Option<Vec<f64>>>()?;
                if bounds.len() < 2 {
                    return None;
                }
                let min = bounds.iter().copied().fold(f64::INFINITY, f64::min);
                let max = bounds.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                // numeric strings coerce like they do for `LessThan` and `GreaterThan`
                let actual = to_number(actual)?;
                Some(min <= actual && actual <= max)
            }

            Self::Contains => Some(actual_contains_expected(expected, actual)),
            Self::NotContains => Some(!actual_contains_expected(expected, actual)),
        }
    }
}

/// Numeric view of a scalar value. Lists and absent values have none.
fn to_number(value: &TriggerValue) -> Option<f64> {
    value.as_scalar()?.to_number()
}

/// Cross-type equality.
///
/// Numbers equal numeric strings of the same magnitude. Strings compare trimmed and
/// case-insensitively. Two lists compare as unordered multisets; a scalar equals a list if it
/// equals any of its elements.
fn values_equal(expected: &TriggerValue, actual: &TriggerValue) -> bool {
    match (expected, actual) {
        (TriggerValue::Absent, _) | (_, TriggerValue::Absent) => false,
        (TriggerValue::List(expected), TriggerValue::List(actual)) => lists_equal(expected, actual),
        (TriggerValue::List(list), scalar) | (scalar, TriggerValue::List(list)) => {
            let Some(scalar) = scalar.as_scalar() else {
                return false;
            };
            list.iter().any(|item| scalars_equal(item, &scalar))
        }
        (expected, actual) => match (expected.as_scalar(), actual.as_scalar()) {
            (Some(expected), Some(actual)) => scalars_equal(&expected, &actual),
            _ => false,
        },
    }
}

fn scalars_equal(a: &Scalar, b: &Scalar) -> bool {
    match (a, b) {
        (Scalar::String(a), Scalar::String(b)) => clean(a) == clean(b),
        _ => match (a.to_number(), b.to_number()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn lists_equal(expected: &[Scalar], actual: &[Scalar]) -> bool {
    if expected.len() != actual.len() {
        return false;
    }

    let mut remaining: Vec<&Scalar> = actual.iter().collect();
    expected.iter().all(|item| {
        let position = remaining
            .iter()
            .position(|candidate| scalars_equal(item, candidate));
        match position {
            Some(index) => {
                remaining.swap_remove(index);
                true
            }
            None => false,
        }
    })
}

/// Case-insensitive substring test. Only string values take part: numbers are never contained.
fn actual_contains_expected(expected: &TriggerValue, actual: &TriggerValue) -> bool {
    fn strings(list: &[Scalar]) -> impl Iterator<Item = &str> {
        list.iter().filter_map(Scalar::as_str)
    }
    fn contains(haystack: &str, needle: &str) -> bool {
        clean(haystack).contains(&clean(needle))
    }

    match (expected, actual) {
        (TriggerValue::String(expected), TriggerValue::String(actual)) => {
            contains(actual, expected)
        }
        (TriggerValue::List(expected), TriggerValue::String(actual)) => {
            strings(expected).any(|expected| contains(actual, expected))
        }
        (TriggerValue::String(expected), TriggerValue::List(actual)) => {
            strings(actual).any(|actual| contains(actual, expected))
        }
        (TriggerValue::List(expected), TriggerValue::List(actual)) => strings(expected)
            .any(|expected| strings(actual).any(|actual| contains(actual, expected))),
        _ => false,
    }
}
