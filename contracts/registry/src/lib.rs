#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, panic_with_error, Address,
    Bytes, BytesN, Env, Vec,
};

const MAX_LABEL_LENGTH: u32 = 63;
const ZERO_ACCOUNT_STR: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";

#[derive(Clone)]
#[contractevent(topics = ["transfer"])]
pub struct EvtTransfer {
    #[topic]
    pub namehash: BytesN<32>,
    pub from: Option<Address>,
    pub to: Option<Address>,
}

#[derive(Clone)]
#[contractevent(topics = ["new_owner"])]
pub struct EvtNewOwner {
    #[topic]
    pub parent: BytesN<32>,
    #[topic]
    pub label_hash: BytesN<32>,
    pub owner: Option<Address>,
}

#[derive(Clone)]
#[contractevent(topics = ["resolver_changed"])]
pub struct EvtResolverChanged {
    #[topic]
    pub namehash: BytesN<32>,
    pub resolver: Option<Address>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[contracterror]
#[repr(u32)]
pub enum RegistryError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    OwnerNotSet = 3,
    ZeroAddress = 4,
    InvalidLabel = 5,
}

#[contract]
pub struct Registry;

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Initialized,
    Owner(BytesN<32>),
    Resolver(BytesN<32>),
}

fn root_node(env: &Env) -> BytesN<32> {
    BytesN::<32>::from_array(env, &[0u8; 32])
}

fn fold_hash(env: &Env, parent: &BytesN<32>, label_hash: &BytesN<32>) -> BytesN<32> {
    let mut data = Bytes::from_array(env, &parent.to_array());
    data.extend_from_array(&label_hash.to_array());
    env.crypto().sha256(&data).to_bytes()
}

fn hash_label(env: &Env, label: &Bytes) -> BytesN<32> {
    if label.is_empty() || label.len() > MAX_LABEL_LENGTH {
        panic_with_error!(env, RegistryError::InvalidLabel);
    }
    env.crypto().sha256(label).to_bytes()
}

/// Hierarchical name registry: every node maps to an owner and an optional
/// resolver, and the owner of a node controls the nodes directly below it.
#[contractimpl]
impl Registry {
    pub fn version(_env: Env) -> u32 {
        1
    }

    /// Hands the root node to `root_owner`. Callable once.
    pub fn init(env: Env, root_owner: Address) {
        let storage = env.storage().persistent();
        if storage.has(&DataKey::Initialized) {
            panic_with_error!(&env, RegistryError::AlreadyInitialized);
        }
        let root_owner = Some(root_owner);
        Self::ensure_not_zero(&env, &root_owner);

        let root = root_node(&env);
        storage.set(&DataKey::Initialized, &true);
        Self::write_owner(&env, &root, &root_owner);

        EvtTransfer {
            namehash: root,
            from: None,
            to: root_owner,
        }
        .publish(&env);
    }

    fn is_zero_account(env: &Env, address: &Address) -> bool {
        let zero = Address::from_str(env, ZERO_ACCOUNT_STR);
        address == &zero
    }

    fn ensure_not_zero(env: &Env, address: &Option<Address>) {
        if let Some(address) = address {
            if Self::is_zero_account(env, address) {
                panic_with_error!(env, RegistryError::ZeroAddress);
            }
        }
    }

    pub(crate) fn read_owner(env: &Env, namehash: &BytesN<32>) -> Option<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::Owner(namehash.clone()))
    }

    pub(crate) fn read_resolver(env: &Env, namehash: &BytesN<32>) -> Option<Address> {
        env.storage()
            .persistent()
            .get(&DataKey::Resolver(namehash.clone()))
    }

    fn write_owner(env: &Env, namehash: &BytesN<32>, owner: &Option<Address>) {
        let key = DataKey::Owner(namehash.clone());
        let storage = env.storage().persistent();
        match owner {
            Some(owner) => storage.set(&key, owner),
            None => storage.remove(&key),
        }
    }

    /// Loads the owner of `namehash` and demands its authorization.
    fn require_node_owner(env: &Env, namehash: &BytesN<32>) -> Address {
        if !env.storage().persistent().has(&DataKey::Initialized) {
            panic_with_error!(env, RegistryError::NotInitialized);
        }
        let owner = Self::read_owner(env, namehash)
            .unwrap_or_else(|| panic_with_error!(env, RegistryError::OwnerNotSet));
        owner.require_auth();
        owner
    }

    /// Transfers `namehash` to `new_owner`; `None` clears ownership.
    pub fn set_owner(env: Env, namehash: BytesN<32>, new_owner: Option<Address>) {
        Self::ensure_not_zero(&env, &new_owner);
        let current_owner = Self::require_node_owner(&env, &namehash);

        Self::write_owner(&env, &namehash, &new_owner);

        EvtTransfer {
            namehash,
            from: Some(current_owner),
            to: new_owner,
        }
        .publish(&env);
    }

    /// Assigns the child `label_hash` of `parent`, overriding any previous
    /// owner of the child. Returns the child namehash.
    pub fn set_subnode_owner(
        env: Env,
        parent: BytesN<32>,
        label_hash: BytesN<32>,
        owner: Option<Address>,
    ) -> BytesN<32> {
        Self::ensure_not_zero(&env, &owner);
        Self::require_node_owner(&env, &parent);

        let node = fold_hash(&env, &parent, &label_hash);
        Self::write_owner(&env, &node, &owner);

        EvtNewOwner {
            parent,
            label_hash,
            owner,
        }
        .publish(&env);

        node
    }

    pub fn owner(env: Env, namehash: BytesN<32>) -> Option<Address> {
        Self::read_owner(&env, &namehash)
    }

    /// Points `namehash` at `resolver`; `None` unsets it.
    pub fn set_resolver(env: Env, namehash: BytesN<32>, resolver: Option<Address>) {
        Self::ensure_not_zero(&env, &resolver);
        Self::require_node_owner(&env, &namehash);

        let key = DataKey::Resolver(namehash.clone());
        let storage = env.storage().persistent();
        match resolver.as_ref() {
            Some(resolver) => storage.set(&key, resolver),
            None => storage.remove(&key),
        }

        EvtResolverChanged { namehash, resolver }.publish(&env);
    }

    pub fn resolver(env: Env, namehash: BytesN<32>) -> Option<Address> {
        Self::read_resolver(&env, &namehash)
    }

    pub fn subnode(env: Env, parent: BytesN<32>, label_hash: BytesN<32>) -> BytesN<32> {
        fold_hash(&env, &parent, &label_hash)
    }

    pub fn label_hash(env: Env, label: Bytes) -> BytesN<32> {
        hash_label(&env, &label)
    }

    /// Labels are ordered from the top-level label down, e.g. `["eth", "alice"]`.
    pub fn namehash(env: Env, labels: Vec<Bytes>) -> BytesN<32> {
        let mut node = root_node(&env);
        for label in labels.iter() {
            let label_hash = hash_label(&env, &label);
            node = fold_hash(&env, &node, &label_hash);
        }
        node
    }
}
