#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, panic_with_error, Address,
    Bytes, BytesN, Env, IntoVal, Symbol,
};

/// Storage keys
mod keys {
    pub const ADDR: &[u8] = b"RES_ADDR"; // namehash -> Address
    pub const PUBKEY: &[u8] = b"RES_PUBK"; // namehash -> PubKey
    pub const TEXT: &[u8] = b"RES_TEXT_"; // namespace prefix: TEXT || namehash || key -> Bytes
    pub const REGISTRY: &[u8] = b"RES_REG"; // singleton: Address (Registry contract)
}

/// Events
#[derive(Clone)]
#[contractevent(topics = ["address_changed"])]
pub struct EvtAddressChanged {
    #[topic]
    pub namehash: BytesN<32>,
    pub addr: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["pubkey_changed"])]
pub struct EvtPubkeyChanged {
    #[topic]
    pub namehash: BytesN<32>,
    pub x: BytesN<32>,
    pub y: BytesN<32>,
}

#[derive(Clone)]
#[contractevent(topics = ["text_changed"])]
pub struct EvtTextChanged {
    #[topic]
    pub namehash: BytesN<32>,
    pub key: Bytes,
}

/// Public key record split in its two 32-byte coordinates.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PubKey {
    pub x: BytesN<32>,
    pub y: BytesN<32>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[contracterror]
#[repr(u32)]
pub enum ResolverError {
    NotInitialized = 1,
    AlreadyInitialized = 2,
    NotOwner = 3,
    InvalidInput = 4,
}

const MAX_TEXT_KEY_LEN: u32 = 256;
fn registry_storage_key(env: &Env) -> Bytes {
    Bytes::from_slice(env, keys::REGISTRY)
}

fn node_storage_key(env: &Env, prefix: &[u8], namehash: &BytesN<32>) -> Bytes {
    let mut key = Bytes::from_slice(env, prefix);
    key.extend_from_array(&namehash.to_array());
    key
}

fn text_storage_key(env: &Env, namehash: &BytesN<32>, text_key: &Bytes) -> Bytes {
    let mut key = node_storage_key(env, keys::TEXT, namehash);
    key.append(text_key);
    key
}

fn validate_text_key(env: &Env, key: &Bytes) {
    if key.is_empty() || key.len() > MAX_TEXT_KEY_LEN {
        panic_with_error!(env, ResolverError::InvalidInput);
    }
}

fn ensure_initialized(env: &Env) -> Address {
    let storage = env.storage().persistent();
    let key = registry_storage_key(env);
    storage
        .get(&key)
        .unwrap_or_else(|| panic_with_error!(env, ResolverError::NotInitialized))
}

fn require_owner(env: &Env, caller: &Address, namehash: &BytesN<32>) {
    let registry = ensure_initialized(env);
    let owner: Option<Address> = env.invoke_contract(
        &registry,
        &Symbol::new(env, "owner"),
        (namehash,).into_val(env),
    );
    if owner.as_ref() != Some(caller) {
        panic_with_error!(env, ResolverError::NotOwner);
    }
}

/// Record store for names; only the registry owner of a name may write its records.
#[contract]
pub struct Resolver;

#[contractimpl]
impl Resolver {
    pub fn version(_env: Env) -> u32 {
        1
    }

    pub fn init(env: Env, registry: Address) {
        let storage = env.storage().persistent();
        let key = registry_storage_key(&env);
        if storage.has(&key) {
            panic_with_error!(&env, ResolverError::AlreadyInitialized);
        }
        storage.set(&key, &registry);
    }

    pub fn addr(env: Env, namehash: BytesN<32>) -> Option<Address> {
        ensure_initialized(&env);
        let storage = env.storage().persistent();
        let key = node_storage_key(&env, keys::ADDR, &namehash);
        storage.get(&key)
    }

    /// Unset records read back as two zeroed coordinates.
    pub fn pubkey(env: Env, namehash: BytesN<32>) -> PubKey {
        ensure_initialized(&env);
        let storage = env.storage().persistent();
        let key = node_storage_key(&env, keys::PUBKEY, &namehash);
        storage.get(&key).unwrap_or_else(|| {
            let zero = BytesN::from_array(&env, &[0u8; 32]);
            PubKey {
                x: zero.clone(),
                y: zero,
            }
        })
    }

    pub fn text(env: Env, namehash: BytesN<32>, key: Bytes) -> Option<Bytes> {
        ensure_initialized(&env);
        validate_text_key(&env, &key);
        let storage = env.storage().persistent();
        let data_key = text_storage_key(&env, &namehash, &key);
        storage.get(&data_key)
    }

    pub fn set_addr(env: Env, caller: Address, namehash: BytesN<32>, addr: Address) {
        caller.require_auth();
        require_owner(&env, &caller, &namehash);

        let storage = env.storage().persistent();
        let key = node_storage_key(&env, keys::ADDR, &namehash);
        storage.set(&key, &addr);

        EvtAddressChanged { namehash, addr }.publish(&env);
    }

    pub fn set_pubkey(
        env: Env,
        caller: Address,
        namehash: BytesN<32>,
        x: BytesN<32>,
        y: BytesN<32>,
    ) {
        caller.require_auth();
        require_owner(&env, &caller, &namehash);

        let storage = env.storage().persistent();
        let key = node_storage_key(&env, keys::PUBKEY, &namehash);
        let record = PubKey {
            x: x.clone(),
            y: y.clone(),
        };
        storage.set(&key, &record);

        EvtPubkeyChanged { namehash, x, y }.publish(&env);
    }

    pub fn set_text(env: Env, caller: Address, namehash: BytesN<32>, key: Bytes, value: Bytes) {
        caller.require_auth();
        validate_text_key(&env, &key);
        require_owner(&env, &caller, &namehash);

        let storage = env.storage().persistent();
        let data_key = text_storage_key(&env, &namehash, &key);
        storage.set(&data_key, &value);

        EvtTextChanged { namehash, key }.publish(&env);
    }

    pub fn registry(env: Env) -> Address {
        ensure_initialized(&env)
    }
}
