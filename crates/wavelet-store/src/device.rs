//! The singleton device row: all identity material plus the account binding
//! established by pairing.

use prost::Message;
use sqlx::SqlitePool;

use wavelet_codec::Jid;
use wavelet_proto::AdvSignedDeviceIdentity;

use crate::error::Result;
use crate::keys::{
    blob_to_array, generate_adv_secret, generate_registration_id, IdentityKeyPair, KeyPair,
    SignedPreKey,
};

/// Version of the device-row layout written by this build. Bumped together
/// with a migration whenever the row shape changes.
pub const DEVICE_SCHEMA_VERSION: u32 = 1;

/// In-memory image of the device row. Private key material stays inside the
/// key types; callers obtain public views only.
#[derive(Clone, Debug)]
pub struct DeviceData {
    pub schema_version: u32,
    pub noise_key: KeyPair,
    pub identity_key: IdentityKeyPair,
    pub signed_pre_key: SignedPreKey,
    pub adv_secret_key: [u8; 32],
    pub registration_id: u32,

    /// Our account JID; present iff the device is paired.
    pub id: Option<Jid>,
    /// Pseudonymous counterpart of `id`.
    pub lid: Option<Jid>,
    pub business_name: String,
    pub platform: String,
    pub push_name: String,
    /// Server attestation committed at pairing; present iff `id` is.
    pub account: Option<AdvSignedDeviceIdentity>,
}

impl DeviceData {
    /// Fresh unpaired device: new keys, empty account binding.
    pub fn generate() -> Self {
        let identity_key = IdentityKeyPair::generate();
        let signed_pre_key = SignedPreKey::generate(1, &identity_key);
        Self {
            schema_version: DEVICE_SCHEMA_VERSION,
            noise_key: KeyPair::generate(),
            identity_key,
            signed_pre_key,
            adv_secret_key: generate_adv_secret(),
            registration_id: generate_registration_id(),
            id: None,
            lid: None,
            business_name: String::new(),
            platform: String::new(),
            push_name: String::new(),
            account: None,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.id.is_some()
    }
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    schema_version: i64,
    noise_secret: Vec<u8>,
    identity_seed: Vec<u8>,
    adv_secret: Vec<u8>,
    registration_id: i64,
    signed_pre_key_id: i64,
    signed_pre_key_secret: Vec<u8>,
    signed_pre_key_sig: Vec<u8>,
    jid: Option<String>,
    lid: Option<String>,
    business_name: String,
    platform: String,
    push_name: String,
    account: Option<Vec<u8>>,
}

/// Load the device row, or `None` when this is a first run.
pub async fn load(pool: &SqlitePool) -> Result<Option<DeviceData>> {
    let Some(row) =
        sqlx::query_as::<_, DeviceRow>("SELECT * FROM device WHERE lock = 1")
            .fetch_optional(pool)
            .await?
    else {
        return Ok(None);
    };

    let identity_key =
        IdentityKeyPair::from_seed(blob_to_array("identity_seed", &row.identity_seed)?);
    let signed_pre_key = SignedPreKey {
        id: row.signed_pre_key_id as u32,
        key_pair: KeyPair::from_secret_bytes(blob_to_array(
            "signed_pre_key_secret",
            &row.signed_pre_key_secret,
        )?),
        signature: blob_to_array("signed_pre_key_sig", &row.signed_pre_key_sig)?,
    };

    let account = match row.account {
        Some(blob) => Some(AdvSignedDeviceIdentity::decode(blob.as_slice())?),
        None => None,
    };

    Ok(Some(DeviceData {
        schema_version: row.schema_version as u32,
        noise_key: KeyPair::from_secret_bytes(blob_to_array("noise_secret", &row.noise_secret)?),
        identity_key,
        signed_pre_key,
        adv_secret_key: blob_to_array("adv_secret", &row.adv_secret)?,
        registration_id: row.registration_id as u32,
        id: row.jid.as_deref().map(|s| s.parse::<Jid>()).transpose()?,
        lid: row.lid.as_deref().map(|s| s.parse::<Jid>()).transpose()?,
        business_name: row.business_name,
        platform: row.platform,
        push_name: row.push_name,
        account,
    }))
}

/// Persist the device row whole (single-row UPSERT).
pub async fn save(pool: &SqlitePool, device: &DeviceData) -> Result<()> {
    let account = device.account.as_ref().map(|a| a.encode_to_vec());
    sqlx::query(
        r#"
        INSERT INTO device
            (lock, schema_version,
             noise_secret, noise_public, identity_seed, identity_public,
             adv_secret, registration_id,
             signed_pre_key_id, signed_pre_key_secret, signed_pre_key_public,
             signed_pre_key_sig,
             jid, lid, business_name, platform, push_name, account)
        VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (lock) DO UPDATE SET
            schema_version = excluded.schema_version,
            jid = excluded.jid,
            lid = excluded.lid,
            business_name = excluded.business_name,
            platform = excluded.platform,
            push_name = excluded.push_name,
            account = excluded.account,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(device.schema_version as i64)
    .bind(device.noise_key.secret_bytes().to_vec())
    .bind(device.noise_key.public_bytes().to_vec())
    .bind(device.identity_key.seed_bytes().to_vec())
    .bind(device.identity_key.public_bytes().to_vec())
    .bind(device.adv_secret_key.to_vec())
    .bind(device.registration_id as i64)
    .bind(device.signed_pre_key.id as i64)
    .bind(device.signed_pre_key.key_pair.secret_bytes().to_vec())
    .bind(device.signed_pre_key.key_pair.public_bytes().to_vec())
    .bind(device.signed_pre_key.signature.to_vec())
    .bind(device.id.as_ref().map(Jid::to_string))
    .bind(device.lid.as_ref().map(Jid::to_string))
    .bind(&device.business_name)
    .bind(&device.platform)
    .bind(&device.push_name)
    .bind(account)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete the device row. Keys are regenerated on next load.
pub async fn delete(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM device").execute(pool).await?;
    Ok(())
}
