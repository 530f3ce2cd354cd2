//! Drift detection between a template and running instances.

use fleet_model::{ChildTemplate, Instance};

/// Returns true if `instance` runs exactly what `template` describes.
///
/// The instance must have a single container whose image, command line and
/// resources equal the template's. Command lines are compared element-wise,
/// so `["a", "bc"]` and `["ab", "c"]` differ.
pub fn instance_is_up_to_date(template: &ChildTemplate, instance: &Instance) -> bool {
    let [container] = instance.spec.containers.as_slice() else {
        return false;
    };

    container.image == template.image
        && container.command == template.command
        && container.resources == template.resources
}

/// Logical AND of [`instance_is_up_to_date`] over `observed`.
///
/// One stale instance makes the whole set stale: command-line changes cannot
/// be applied to a running instance in place.
pub fn is_up_to_date<'a, I>(template: &ChildTemplate, observed: I) -> bool
where
    I: IntoIterator<Item = &'a Instance>,
{
    observed
        .into_iter()
        .all(|instance| instance_is_up_to_date(template, instance))
}
