//! Device-identity resolver (C2, spec §4.2): turns a [`CanonicalObservation`]
//! into a [`Resolution`] against a [`DeviceDirectory`].
//!
//! Resolution for messages from the same device is only order-sensitive
//! insofar as the directory itself is read-consistent; ordering across
//! devices is not this crate's concern (it's enforced upstream by the
//! per-device worker partitioning in the supervisor, spec §5).

use ingest_core::{CanonicalObservation, Confidence, Resolution, SourceVendor};
use ingest_storage::{DeviceDirectory, StorageResult};

/// Resolves `obs` to a patient or hospital via `directory`, following the
/// per-vendor algorithm in spec §4.2.
pub async fn resolve(
    directory: &dyn DeviceDirectory,
    obs: &CanonicalObservation,
) -> StorageResult<Resolution> {
    match obs.source_vendor {
        SourceVendor::Kati => resolve_kati(directory, obs).await,
        SourceVendor::Qube => resolve_qube(directory, obs).await,
        SourceVendor::Ava4 => resolve_ava4(directory, obs).await,
    }
}

async fn resolve_kati(
    directory: &dyn DeviceDirectory,
    obs: &CanonicalObservation,
) -> StorageResult<Resolution> {
    let Some(imei) = obs.device_imei.as_deref() else {
        return Ok(Resolution::unresolved());
    };
    let watch = directory.find_watch_by_imei(imei).await?;
    Ok(match watch.and_then(|w| w.patient_id) {
        Some(patient_id) => Resolution { patient_id: Some(patient_id), hospital_id: None, confidence: Confidence::Exact },
        None => Resolution::unresolved(),
    })
}

async fn resolve_qube(
    directory: &dyn DeviceDirectory,
    obs: &CanonicalObservation,
) -> StorageResult<Resolution> {
    let Some(imei) = obs.device_imei.as_deref() else {
        return Ok(Resolution::unresolved());
    };
    let hospital_box = directory.find_hospital_box_by_imei(imei).await?;
    Ok(match hospital_box.and_then(|b| b.hospital_id) {
        Some(hospital_id) => Resolution { patient_id: None, hospital_id: Some(hospital_id), confidence: Confidence::Exact },
        None => Resolution::unresolved(),
    })
}

async fn resolve_ava4(
    directory: &dyn DeviceDirectory,
    obs: &CanonicalObservation,
) -> StorageResult<Resolution> {
    if let Some(sub_mac) = obs.sub_device_mac.as_deref() {
        return resolve_ava4_sub_device(directory, obs, sub_mac).await;
    }

    let Some(gateway_mac) = obs.gateway_mac.as_deref() else {
        return Ok(Resolution::unresolved());
    };
    let gateway = directory.find_gateway_by_mac(gateway_mac).await?;
    Ok(match gateway.and_then(|g| g.patient_id) {
        Some(patient_id) => Resolution { patient_id: Some(patient_id), hospital_id: None, confidence: Confidence::Exact },
        None => Resolution::unresolved(),
    })
}

/// Reverse-indexes a sub-device MAC to `(patient_id, declared_kind)`. A
/// mismatch between the registry's declared kind and the classifier's
/// `sub_device_kind` does not block resolution — the record is still
/// resolved, only tagged `Conflict` so downstream auditing can flag it.
async fn resolve_ava4_sub_device(
    directory: &dyn DeviceDirectory,
    obs: &CanonicalObservation,
    sub_mac: &str,
) -> StorageResult<Resolution> {
    let Some((patient_id, declared_kind)) = directory.find_registry_by_sub_mac(sub_mac).await? else {
        return Ok(Resolution::unresolved());
    };
    let confidence = if declared_kind == obs.sub_device_kind {
        Confidence::Exact
    } else {
        Confidence::Conflict
    };
    Ok(Resolution { patient_id: Some(patient_id), hospital_id: None, confidence })
}
