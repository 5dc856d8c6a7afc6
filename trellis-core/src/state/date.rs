//! Reactive Dates
//!
//! Dates are the one mutable built-in a state tree can hold. A date is not a
//! node of its own: it lives in a property of its owner, and every mutator
//! notifies that property, even when the new component equals the old one.

use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};

use super::node::Reactive;
use super::value::format_date;
use crate::error::StateError;

/// Handle to a date stored in a reactive property.
#[derive(Clone)]
pub struct ReactiveDate {
    owner: Reactive,
    prop: String,
}

impl ReactiveDate {
    pub(crate) fn new(owner: Reactive, prop: &str) -> Self {
        Self {
            owner,
            prop: prop.to_string(),
        }
    }

    /// The node holding this date.
    pub fn owner(&self) -> &Reactive {
        &self.owner
    }

    pub fn prop(&self) -> &str {
        &self.prop
    }

    /// Current value, subscribing the running effect to the owning property.
    ///
    /// `None` once the property was overwritten with something else.
    pub fn get(&self) -> Option<DateTime<Utc>> {
        self.owner.track(&self.prop);
        self.owner.date_untracked(&self.prop)
    }

    pub fn get_untracked(&self) -> Option<DateTime<Utc>> {
        self.owner.date_untracked(&self.prop)
    }

    pub fn set_year(&self, year: i32) -> Result<(), StateError> {
        self.update("year", i64::from(year), |date| date.with_year(year))
    }

    /// Set the month, 1 through 12.
    pub fn set_month(&self, month: u32) -> Result<(), StateError> {
        self.update("month", i64::from(month), |date| date.with_month(month))
    }

    /// Set the day of the month, starting at 1.
    pub fn set_day(&self, day: u32) -> Result<(), StateError> {
        self.update("day", i64::from(day), |date| date.with_day(day))
    }

    pub fn set_hour(&self, hour: u32) -> Result<(), StateError> {
        self.update("hour", i64::from(hour), |date| date.with_hour(hour))
    }

    pub fn set_minute(&self, minute: u32) -> Result<(), StateError> {
        self.update("minute", i64::from(minute), |date| date.with_minute(minute))
    }

    pub fn set_second(&self, second: u32) -> Result<(), StateError> {
        self.update("second", i64::from(second), |date| date.with_second(second))
    }

    /// Replace the whole timestamp.
    pub fn set(&self, value: DateTime<Utc>) -> Result<(), StateError> {
        self.update("timestamp", value.timestamp(), |_| Some(value))
    }

    fn update<F>(&self, component: &'static str, value: i64, f: F) -> Result<(), StateError>
    where
        F: FnOnce(DateTime<Utc>) -> Option<DateTime<Utc>>,
    {
        self.owner.update_date(&self.prop, component, value, f)
    }
}

impl fmt::Debug for ReactiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveDate")
            .field("owner", &self.owner)
            .field("prop", &self.prop)
            .field("value", &self.get_untracked())
            .finish()
    }
}

impl fmt::Display for ReactiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_untracked() {
            Some(date) => f.write_str(&format_date(&date)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Scheduler};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn state_with_date() -> (Reactive, ReactiveDate) {
        let root = Reactive::wrap(json!({ "title": "launch" })).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        root.set("at", at).unwrap();
        let date = root.get("at").as_date().cloned().unwrap();
        (root, date)
    }

    #[test]
    fn mutators_update_the_owner() {
        let (root, date) = state_with_date();
        date.set_year(2025).unwrap();
        date.set_hour(8).unwrap();
        assert_eq!(root.get("at").to_string(), "2025-01-31T08:00:00.000Z");
        assert_eq!(root.to_json()["at"], json!("2025-01-31T08:00:00.000Z"));
    }

    #[test]
    fn invalid_components_are_rejected() {
        let (_root, date) = state_with_date();
        let err = date.set_month(2).unwrap_err();
        assert_eq!(
            err,
            StateError::InvalidDate {
                prop: "at".into(),
                component: "month",
                value: 2,
            }
        );
        assert!(date.set_minute(60).is_err());
    }

    #[test]
    fn equal_component_still_notifies() {
        let (root, date) = state_with_date();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let changes_clone = changes.clone();
        let _sub = root
            .add_listener("at", move |change| changes_clone.lock().push(change.path.clone()))
            .unwrap();

        date.set_day(31).unwrap();
        assert_eq!(*changes.lock(), vec!["at".to_string()]);
    }

    #[test]
    fn overwritten_property_is_no_longer_a_date() {
        let (root, date) = state_with_date();
        root.set("at", "tomorrow").unwrap();
        assert_eq!(date.get_untracked(), None);
        assert_eq!(date.set_day(1), Err(StateError::NotADate("at".into())));
    }

    #[tokio::test]
    async fn reading_a_date_tracks_its_property() {
        let scheduler = Scheduler::default();
        let (_root, date) = state_with_date();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let effect = Effect::new_sync(&scheduler, {
            let date = date.clone();
            let seen = seen.clone();
            move || {
                seen.lock().push(date.get().map(|d| d.year()));
                Ok(())
            }
        });
        effect.run().await.unwrap();

        date.set_year(2030).unwrap();
        scheduler.settle().await;
        assert_eq!(*seen.lock(), vec![Some(2024), Some(2030)]);
    }
}
