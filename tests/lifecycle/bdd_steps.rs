//! BDD step definitions for the volume lifecycle.

use ceph_rbd_driver::BlockDeviceApi;
use ceph_rbd_driver::test_support::ONE_WATCHER;
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{LifecycleContext, Outcome, dataset_uuid, error_kind, image_for};

const MIB: u64 = 1_048_576;

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a pool \"{pool}\" on host \"{host}\"")]
fn pool_on_host(
    mut lifecycle_context: LifecycleContext,
    pool: String,
    host: String,
) -> LifecycleContext {
    lifecycle_context.pool = pool.trim().to_owned();
    lifecycle_context
        .cluster
        .insert_pool(&lifecycle_context.pool);
    lifecycle_context
        .runner
        .respond_success("hostname", &["-s"], &format!("{}\n", host.trim()));
    lifecycle_context.publish_mappings();
    lifecycle_context
}

#[given("a volume for dataset \"{dataset}\" with {mib:u32} MiB")]
fn existing_volume(lifecycle_context: LifecycleContext, dataset: String, mib: u32) -> LifecycleContext {
    let image = image_for(&dataset);
    lifecycle_context
        .cluster
        .insert_image(&lifecycle_context.pool, &image, u64::from(mib) * MIB);
    lifecycle_context.stub_image(&image);
    lifecycle_context
}

#[given("a foreign image \"{image}\"")]
fn foreign_image(lifecycle_context: LifecycleContext, image: String) -> LifecycleContext {
    lifecycle_context
        .cluster
        .insert_image(&lifecycle_context.pool, image.trim(), MIB);
    lifecycle_context
}

#[given("the volume for dataset \"{dataset}\" is watched by another client")]
fn watched_volume(lifecycle_context: LifecycleContext, dataset: String) -> LifecycleContext {
    let image = image_for(&dataset);
    lifecycle_context
        .runner
        .respond_success("rbd", &["status", image.as_str()], ONE_WATCHER);
    lifecycle_context
}

#[given("the volume for dataset \"{dataset}\" is mapped at \"{device}\"")]
fn mapped_volume(
    mut lifecycle_context: LifecycleContext,
    dataset: String,
    device: String,
) -> LifecycleContext {
    lifecycle_context
        .mapped
        .push((image_for(&dataset), device.trim().to_owned()));
    lifecycle_context.publish_mappings();
    lifecycle_context
}

#[when("I create a volume for dataset \"{dataset}\" with {mib:u32} MiB")]
fn create_volume(
    mut lifecycle_context: LifecycleContext,
    dataset: String,
    mib: u32,
) -> LifecycleContext {
    let driver = lifecycle_context.driver();
    let result = driver.create_volume(dataset_uuid(&dataset), u64::from(mib) * MIB);
    if let Ok(volume) = result.as_ref() {
        lifecycle_context.stub_image(&volume.blockdevice_id);
    }
    lifecycle_context.record(result, |volume| Outcome::Volume(Some(volume)));
    lifecycle_context
}

#[when("I attach the volume for dataset \"{dataset}\" to \"{host}\"")]
fn attach_volume(
    mut lifecycle_context: LifecycleContext,
    dataset: String,
    host: String,
) -> LifecycleContext {
    let result = lifecycle_context
        .driver()
        .attach_volume(&image_for(&dataset), host.trim());
    lifecycle_context.record(result, Outcome::Volume);
    lifecycle_context
}

#[when("I detach the volume for dataset \"{dataset}\"")]
fn detach_volume(mut lifecycle_context: LifecycleContext, dataset: String) -> LifecycleContext {
    let result = lifecycle_context
        .driver()
        .detach_volume(&image_for(&dataset));
    lifecycle_context.record(result, |()| Outcome::Done);
    lifecycle_context
}

#[when("I destroy the volume for dataset \"{dataset}\"")]
fn destroy_volume(mut lifecycle_context: LifecycleContext, dataset: String) -> LifecycleContext {
    let result = lifecycle_context
        .driver()
        .destroy_volume(&image_for(&dataset));
    lifecycle_context.record(result, |()| Outcome::Done);
    lifecycle_context
}

#[when("I ask for the device path of dataset \"{dataset}\"")]
fn device_path(mut lifecycle_context: LifecycleContext, dataset: String) -> LifecycleContext {
    let result = lifecycle_context
        .driver()
        .get_device_path(&image_for(&dataset))
        .map(|path| path.into_string());
    lifecycle_context.record(result, Outcome::DevicePath);
    lifecycle_context
}

#[when("I list volumes")]
fn list_volumes(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    let result = lifecycle_context.driver().list_volumes();
    if let Ok(volumes) = result.as_ref() {
        lifecycle_context.listing.clone_from(volumes);
    }
    lifecycle_context.record(result, Outcome::Volumes);
    lifecycle_context
}

#[when("I sweep managed volumes")]
fn sweep(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    let result = lifecycle_context.driver().destroy_all_volumes();
    lifecycle_context.record(result, Outcome::Swept);
    lifecycle_context
}

fn outcome(lifecycle_context: &LifecycleContext) -> Result<&Outcome, StepError> {
    lifecycle_context
        .outcome
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("missing outcome")))
}

#[then("the operation succeeds")]
fn operation_succeeds(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match outcome(lifecycle_context)? {
        Outcome::Failed(err) => Err(StepError::Assertion(format!(
            "expected success, got: {err}"
        ))),
        _ => Ok(()),
    }
}

#[then("the operation fails with \"{kind}\"")]
fn operation_fails(lifecycle_context: &LifecycleContext, kind: String) -> Result<(), StepError> {
    let Outcome::Failed(err) = outcome(lifecycle_context)? else {
        return Err(StepError::Assertion(format!(
            "expected {kind} failure, got success"
        )));
    };
    if error_kind(err) == kind.trim() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {kind} failure, got: {err:?}"
        )))
    }
}

#[then("the listing has {count:u32} entries")]
fn listing_has(lifecycle_context: &LifecycleContext, count: u32) -> Result<(), StepError> {
    let listed = lifecycle_context.listing.len();
    if u32::try_from(listed).is_ok_and(|listed| listed == count) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} volumes, got {:?}",
            lifecycle_context.listing
        )))
    }
}

fn listed_attachment(
    lifecycle_context: &LifecycleContext,
    dataset: &str,
) -> Result<Option<String>, StepError> {
    let image = image_for(dataset);
    lifecycle_context
        .listing
        .iter()
        .find(|volume| volume.blockdevice_id == image)
        .map(|volume| volume.attached_to.clone())
        .ok_or_else(|| StepError::Assertion(format!("{image} was not listed")))
}

#[then("the volume for dataset \"{dataset}\" is not attached")]
fn volume_not_attached(
    lifecycle_context: &LifecycleContext,
    dataset: String,
) -> Result<(), StepError> {
    match listed_attachment(lifecycle_context, &dataset)? {
        None => Ok(()),
        Some(host) => Err(StepError::Assertion(format!(
            "expected no attachment, got {host}"
        ))),
    }
}

#[then("the volume for dataset \"{dataset}\" is attached to \"{host}\"")]
fn volume_attached_to(
    lifecycle_context: &LifecycleContext,
    dataset: String,
    host: String,
) -> Result<(), StepError> {
    let attached = listed_attachment(lifecycle_context, &dataset)?;
    if attached.as_deref() == Some(host.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected attachment to {host}, got {attached:?}"
        )))
    }
}

#[then("the volume for dataset \"{dataset}\" was mapped on this host")]
fn volume_was_mapped(
    lifecycle_context: &LifecycleContext,
    dataset: String,
) -> Result<(), StepError> {
    let image = image_for(&dataset);
    if !lifecycle_context.ran(&format!("map {image}")) {
        return Err(StepError::Assertion(format!("{image} was never mapped")));
    }
    match outcome(lifecycle_context)? {
        Outcome::Volume(Some(volume)) if volume.attached_to.is_some() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected an attached volume, got {other:?}"
        ))),
    }
}

#[then("no map command was run")]
fn no_map(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    if lifecycle_context.ran(" map ") {
        Err(StepError::Assertion(format!(
            "unexpected map in {:?}",
            lifecycle_context.runner.command_strings()
        )))
    } else {
        Ok(())
    }
}

#[then("no unmap command was run")]
fn no_unmap(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    if lifecycle_context.ran(" unmap ") {
        Err(StepError::Assertion(format!(
            "unexpected unmap in {:?}",
            lifecycle_context.runner.command_strings()
        )))
    } else {
        Ok(())
    }
}

#[then("the device path is \"{device}\"")]
fn device_path_is(lifecycle_context: &LifecycleContext, device: String) -> Result<(), StepError> {
    match outcome(lifecycle_context)? {
        Outcome::DevicePath(path) if path == device.trim() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected device path {device}, got {other:?}"
        ))),
    }
}

#[then("the sweep unmapped {unmapped:u32} and destroyed {destroyed:u32} volumes")]
fn sweep_counts(
    lifecycle_context: &LifecycleContext,
    unmapped: u32,
    destroyed: u32,
) -> Result<(), StepError> {
    let Outcome::Swept(summary) = outcome(lifecycle_context)? else {
        return Err(StepError::Assertion(String::from("expected a sweep outcome")));
    };
    if summary.unmapped == unmapped as usize && summary.destroyed == destroyed as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {unmapped} unmapped and {destroyed} destroyed, got {summary:?}"
        )))
    }
}

#[then("the pool holds only \"{image}\"")]
fn pool_holds_only(lifecycle_context: &LifecycleContext, image: String) -> Result<(), StepError> {
    let images = lifecycle_context.cluster.images(&lifecycle_context.pool);
    if images == [image.trim()] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only {image}, pool holds {images:?}"
        )))
    }
}
