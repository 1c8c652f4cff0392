// LTI 1.1 → 1.3 migration claim verification.
//
// Migrated deployments carry an HMAC signature binding the legacy OAuth
// consumer key to the 1.3 launch. A failed or absent signature never
// invalidates the launch itself; it only withholds the legacy identifiers
// from record linking.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use lti_tool_core::claims::LaunchData;

type HmacSha256 = Hmac<Sha256>;

/// Compute the migration claim signature.
///
/// Fields are joined with `&` in this fixed order, expiry stringified as
/// integer seconds, then HMAC-SHA256 under the legacy shared secret and
/// base64-encoded.
pub fn compute_oauth_consumer_key_sign(
    oauth_consumer_key: &str,
    deployment_id: &str,
    iss: &str,
    aud: &str,
    exp: i64,
    nonce: &str,
    oauth_secret: &str,
) -> String {
    let base_string = [
        oauth_consumer_key,
        deployment_id,
        iss,
        aud,
        &exp.to_string(),
        nonce,
    ]
    .join("&");

    let mut mac = HmacSha256::new_from_slice(oauth_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(base_string.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify the signature carried in a launch's LTI 1.1 migration claim.
///
/// Returns `false` when the migration block, consumer key, or signature
/// sub-field is absent (the normal case for pure 1.3 launches) and on any
/// mismatch. Comparison is constant-time.
pub fn validate_migration_claim(launch_data: &LaunchData, oauth_secret: &str) -> bool {
    let Some(migration) = launch_data.migration() else {
        return false;
    };
    let (Some(consumer_key), Some(claim_sign)) = (
        migration.oauth_consumer_key.as_deref(),
        migration.oauth_consumer_key_sign.as_deref(),
    ) else {
        return false;
    };

    let (Some(deployment_id), Some(iss), Some(aud), Some(exp), Some(nonce)) = (
        launch_data.deployment_id(),
        launch_data.iss(),
        launch_data.primary_aud(),
        launch_data.exp(),
        launch_data.nonce(),
    ) else {
        return false;
    };

    let computed = compute_oauth_consumer_key_sign(
        consumer_key,
        deployment_id,
        iss,
        &aud,
        exp,
        nonce,
        oauth_secret,
    );
    claim_sign.as_bytes().ct_eq(computed.as_bytes()).into()
}
