//! BDD scenarios for the RBD volume lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Create a volume and list it as unattached"
)]
fn scenario_create_and_list(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Creating the same dataset twice is rejected"
)]
fn scenario_duplicate_create(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Attach a volume to this host"
)]
fn scenario_attach_locally(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Attaching a volume watched elsewhere is rejected"
)]
fn scenario_attach_watched(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Attaching to another host does nothing"
)]
fn scenario_attach_foreign_host(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Detaching an unmapped volume is a no-op"
)]
fn scenario_detach_unmapped(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Device path of an unmapped volume is unavailable"
)]
fn scenario_device_path_unmapped(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Mapped volumes report this host and their device path"
)]
fn scenario_mapped_volume(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Destroying an unknown volume is rejected"
)]
fn scenario_destroy_unknown(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/volume_lifecycle.feature",
    name = "Foreign images are never listed or swept"
)]
fn scenario_foreign_images(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}
