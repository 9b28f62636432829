// src/strategy/eligibility.rs

use crate::model::stand::Stand;
use crate::model::template::EventTemplate;

/// A stand that one event template may disturb this timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligible {
    pub stand: usize,
    pub template: usize,
}

/// Age window and disturbance history rules of a template.
pub fn template_accepts(template: &EventTemplate, stand: &Stand) -> bool {
    template.age_window().contains(&stand.age)
        && template
            .last_dist_id
            .map_or(true, |id| stand.last_disturbance_id == Some(id))
        && template
            .min_since_last_dist
            .map_or(true, |min| min <= stand.time_since_last_disturbance)
}

/// Joins the undisturbed stands with the templates matching their classifiers.
pub fn eligible_pairs(stands: &[Stand], templates: &[EventTemplate]) -> Vec<Eligible> {
    stands
        .iter()
        .enumerate()
        .filter(|(_, stand)| !stand.is_disturbed())
        .flat_map(|(s, stand)| {
            templates
                .iter()
                .enumerate()
                .filter(move |(_, t)| t.pattern.matches(&stand.classifiers))
                .filter(move |(_, t)| template_accepts(t, stand))
                .map(move |(t, _)| Eligible {
                    stand: s,
                    template: t,
                })
        })
        .collect()
}
