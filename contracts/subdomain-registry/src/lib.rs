#![no_std]

#[cfg(test)]
extern crate std;

use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, log, panic_with_error,
    token::TokenClient, Address, Bytes, BytesN, Env,
};

const DEFAULT_RELEASE_DELAY_SECS: u64 = 31_536_000;

#[derive(Clone)]
#[contracttype]
enum DataKey {
    Token,
    Registry,
    Resolver,
    Controller,
    ParentRegistry,
    ReleaseDelay,
    Domain(BytesN<32>),
    Account(BytesN<32>),
}

#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DomainState {
    Inactive = 0,
    Active = 1,
    Moved = 2,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DomainConfig {
    pub state: DomainState,
    pub price: i128,
}

/// Escrow held for one subdomain. `balance` is the price paid at
/// registration and is not affected by later price changes.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubdomainAccount {
    pub balance: i128,
    pub creation_time: u64,
    pub funds_owner: Address,
    pub released: bool,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum SubdomainRegistryError {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    NotController = 3,
    NotDomainOwner = 4,
    NotFundsOwner = 5,
    NotNameOwner = 6,
    NotParentRegistry = 7,
    DomainInactive = 8,
    SubdomainTaken = 9,
    AccountMissing = 10,
    ReleaseDelayPending = 11,
    InvalidPrice = 12,
    InvalidParams = 13,
    InsufficientFunds = 14,
    InsufficientAllowance = 15,
}

#[derive(Clone)]
#[contractevent(topics = ["domain_price"])]
pub struct EvtDomainPrice {
    #[topic]
    pub namehash: BytesN<32>,
    pub price: i128,
}

#[derive(Clone)]
#[contractevent(topics = ["subdomain_registered"])]
pub struct EvtSubdomainRegistered {
    #[topic]
    pub namehash: BytesN<32>,
    pub owner: Address,
    pub balance: i128,
}

#[derive(Clone)]
#[contractevent(topics = ["subdomain_released"])]
pub struct EvtSubdomainReleased {
    #[topic]
    pub namehash: BytesN<32>,
    pub funds_owner: Address,
    pub amount: i128,
}

#[derive(Clone)]
#[contractevent(topics = ["funds_owner_changed"])]
pub struct EvtFundsOwnerChanged {
    #[topic]
    pub namehash: BytesN<32>,
    pub funds_owner: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["domain_moved"])]
pub struct EvtDomainMoved {
    #[topic]
    pub namehash: BytesN<32>,
    pub new_registry: Address,
}

#[derive(Clone)]
#[contractevent(topics = ["controller_changed"])]
pub struct EvtControllerChanged {
    pub previous: Address,
    pub controller: Address,
}

fn read_singleton(env: &Env, key: &DataKey) -> Address {
    env.storage()
        .persistent()
        .get(key)
        .unwrap_or_else(|| panic_with_error!(env, SubdomainRegistryError::NotInitialized))
}

fn read_token(env: &Env) -> Address {
    read_singleton(env, &DataKey::Token)
}

fn read_registry(env: &Env) -> Address {
    read_singleton(env, &DataKey::Registry)
}

fn read_resolver(env: &Env) -> Address {
    read_singleton(env, &DataKey::Resolver)
}

fn read_controller(env: &Env) -> Address {
    read_singleton(env, &DataKey::Controller)
}

fn read_parent_registry(env: &Env) -> Option<Address> {
    env.storage().persistent().get(&DataKey::ParentRegistry)
}

fn read_release_delay(env: &Env) -> u64 {
    env.storage()
        .persistent()
        .get(&DataKey::ReleaseDelay)
        .unwrap_or_else(|| panic_with_error!(env, SubdomainRegistryError::NotInitialized))
}

fn read_domain(env: &Env, domain: &BytesN<32>) -> Option<DomainConfig> {
    env.storage()
        .persistent()
        .get(&DataKey::Domain(domain.clone()))
}

fn write_domain(env: &Env, domain: &BytesN<32>, config: &DomainConfig) {
    env.storage()
        .persistent()
        .set(&DataKey::Domain(domain.clone()), config);
}

fn read_active_domain(env: &Env, domain: &BytesN<32>) -> DomainConfig {
    read_domain(env, domain)
        .filter(|config| config.state == DomainState::Active)
        .unwrap_or_else(|| panic_with_error!(env, SubdomainRegistryError::DomainInactive))
}

fn read_account(env: &Env, subdomain: &BytesN<32>) -> Option<SubdomainAccount> {
    env.storage()
        .persistent()
        .get(&DataKey::Account(subdomain.clone()))
}

fn write_account(env: &Env, subdomain: &BytesN<32>, account: &SubdomainAccount) {
    env.storage()
        .persistent()
        .set(&DataKey::Account(subdomain.clone()), account);
}

/// Live (not yet released) account of `subdomain`.
fn read_open_account(env: &Env, subdomain: &BytesN<32>) -> SubdomainAccount {
    read_account(env, subdomain)
        .filter(|account| !account.released)
        .unwrap_or_else(|| panic_with_error!(env, SubdomainRegistryError::AccountMissing))
}

fn ensure_initialized(env: &Env) {
    if !env.storage().persistent().has(&DataKey::Registry) {
        panic_with_error!(env, SubdomainRegistryError::NotInitialized);
    }
}

fn ensure_controller(env: &Env, caller: &Address) {
    let controller = read_controller(env);
    if controller != *caller {
        panic_with_error!(env, SubdomainRegistryError::NotController);
    }
}

fn ensure_valid_price(env: &Env, price: i128) {
    if price < 0 {
        panic_with_error!(env, SubdomainRegistryError::InvalidPrice);
    }
}

fn is_zero(half: &BytesN<32>) -> bool {
    half.to_array() == [0u8; 32]
}

/// Same derivation as the registry's `subnode`.
fn fold_hash(env: &Env, parent: &BytesN<32>, label_hash: &BytesN<32>) -> BytesN<32> {
    let mut data = Bytes::from_array(env, &parent.to_array());
    data.extend_from_array(&label_hash.to_array());
    env.crypto().sha256(&data).to_bytes()
}

/// Pulls `amount` from `payer` into this contract's custody.
fn collect_fee(env: &Env, payer: &Address, amount: i128) {
    let token = TokenClient::new(env, &read_token(env));
    let this = env.current_contract_address();
    if token.allowance(payer, &this) < amount {
        panic_with_error!(env, SubdomainRegistryError::InsufficientAllowance);
    }
    if token.balance(payer) < amount {
        panic_with_error!(env, SubdomainRegistryError::InsufficientFunds);
    }
    token.transfer_from(&this, payer, &this, &amount);
}

mod registry_api {
    use soroban_sdk::{Address, BytesN, Env, IntoVal, Symbol};

    pub fn owner(env: &Env, registry: &Address, namehash: &BytesN<32>) -> Option<Address> {
        env.invoke_contract(
            registry,
            &Symbol::new(env, "owner"),
            (namehash.clone(),).into_val(env),
        )
    }

    pub fn set_owner(
        env: &Env,
        registry: &Address,
        namehash: &BytesN<32>,
        owner: Option<Address>,
    ) {
        env.invoke_contract::<()>(
            registry,
            &Symbol::new(env, "set_owner"),
            (namehash.clone(), owner).into_val(env),
        );
    }

    pub fn set_subnode_owner(
        env: &Env,
        registry: &Address,
        parent: &BytesN<32>,
        label_hash: &BytesN<32>,
        owner: Option<Address>,
    ) -> BytesN<32> {
        env.invoke_contract(
            registry,
            &Symbol::new(env, "set_subnode_owner"),
            (parent.clone(), label_hash.clone(), owner).into_val(env),
        )
    }

    pub fn set_resolver(
        env: &Env,
        registry: &Address,
        namehash: &BytesN<32>,
        resolver: Option<Address>,
    ) {
        env.invoke_contract::<()>(
            registry,
            &Symbol::new(env, "set_resolver"),
            (namehash.clone(), resolver).into_val(env),
        );
    }
}

mod resolver_api {
    use soroban_sdk::{Address, BytesN, Env, IntoVal, Symbol};

    pub fn set_addr(
        env: &Env,
        resolver: &Address,
        caller: &Address,
        namehash: &BytesN<32>,
        addr: &Address,
    ) {
        env.invoke_contract::<()>(
            resolver,
            &Symbol::new(env, "set_addr"),
            (caller.clone(), namehash.clone(), addr.clone()).into_val(env),
        );
    }

    pub fn set_pubkey(
        env: &Env,
        resolver: &Address,
        caller: &Address,
        namehash: &BytesN<32>,
        x: &BytesN<32>,
        y: &BytesN<32>,
    ) {
        env.invoke_contract::<()>(
            resolver,
            &Symbol::new(env, "set_pubkey"),
            (caller.clone(), namehash.clone(), x.clone(), y.clone()).into_val(env),
        );
    }
}

/// Leases subdomains of the domains it owns in the registry, holding the
/// registration fee in escrow until the subdomain is released.
#[contract]
pub struct SubdomainRegistry;

#[contractimpl]
impl SubdomainRegistry {
    /// One-time initializer. `parent_registry` is the instance allowed to
    /// migrate domains into this one.
    pub fn init(
        env: Env,
        token: Address,
        registry: Address,
        resolver: Address,
        controller: Address,
        parent_registry: Option<Address>,
    ) {
        let storage = env.storage().persistent();
        if storage.has(&DataKey::Registry) {
            panic_with_error!(&env, SubdomainRegistryError::AlreadyInitialized);
        }
        storage.set(&DataKey::Token, &token);
        storage.set(&DataKey::Registry, &registry);
        storage.set(&DataKey::Resolver, &resolver);
        storage.set(&DataKey::Controller, &controller);
        storage.set(&DataKey::ReleaseDelay, &DEFAULT_RELEASE_DELAY_SECS);
        if let Some(parent) = parent_registry.as_ref() {
            storage.set(&DataKey::ParentRegistry, parent);
        }
    }

    /// Activates `domain` at `price`. The domain must already belong to this
    /// contract in the registry, or to the caller, who hands it over here.
    pub fn add_domain(env: Env, caller: Address, domain: BytesN<32>, price: i128) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_controller(&env, &caller);
        ensure_valid_price(&env, price);

        let registry = read_registry(&env);
        let this = env.current_contract_address();
        match registry_api::owner(&env, &registry, &domain) {
            Some(owner) if owner == this => {}
            Some(owner) if owner == caller => {
                registry_api::set_owner(&env, &registry, &domain, Some(this));
            }
            _ => panic_with_error!(&env, SubdomainRegistryError::NotDomainOwner),
        }

        let config = DomainConfig {
            state: DomainState::Active,
            price,
        };
        write_domain(&env, &domain, &config);
        EvtDomainPrice {
            namehash: domain,
            price,
        }
        .publish(&env);
    }

    pub fn set_domain_price(env: Env, caller: Address, domain: BytesN<32>, price: i128) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_controller(&env, &caller);
        ensure_valid_price(&env, price);

        let mut config = read_active_domain(&env, &domain);
        config.price = price;
        write_domain(&env, &domain, &config);
        EvtDomainPrice {
            namehash: domain,
            price,
        }
        .publish(&env);
    }

    /// Price of a registration under `domain`; zero when the domain is free
    /// or not active here. Use `domain` to tell those apart.
    pub fn get_price(env: Env, domain: BytesN<32>) -> i128 {
        read_domain(&env, &domain)
            .filter(|config| config.state == DomainState::Active)
            .map(|config| config.price)
            .unwrap_or(0)
    }

    pub fn domain(env: Env, domain: BytesN<32>) -> Option<DomainConfig> {
        read_domain(&env, &domain)
    }

    /// Registers `label_hash` under `domain` for the caller and escrows the
    /// domain price. Resolver records are written only when a target address
    /// or a non-zero pubkey half is given.
    pub fn register(
        env: Env,
        caller: Address,
        label_hash: BytesN<32>,
        domain: BytesN<32>,
        target: Option<Address>,
        pubkey_x: BytesN<32>,
        pubkey_y: BytesN<32>,
    ) -> BytesN<32> {
        ensure_initialized(&env);
        caller.require_auth();

        let config = read_active_domain(&env, &domain);
        let registry = read_registry(&env);
        let subdomain = fold_hash(&env, &domain, &label_hash);

        if registry_api::owner(&env, &registry, &subdomain).is_some() {
            panic_with_error!(&env, SubdomainRegistryError::SubdomainTaken);
        }
        if let Some(existing) = read_account(&env, &subdomain) {
            if !existing.released {
                panic_with_error!(&env, SubdomainRegistryError::SubdomainTaken);
            }
        }

        if config.price > 0 {
            collect_fee(&env, &caller, config.price);
        }

        let resolve_pubkey = !is_zero(&pubkey_x) || !is_zero(&pubkey_y);
        if target.is_some() || resolve_pubkey {
            // Take the node first so the resolver accepts our writes.
            let this = env.current_contract_address();
            let resolver = read_resolver(&env);
            let this_owner = Some(this.clone());
            registry_api::set_subnode_owner(&env, &registry, &domain, &label_hash, this_owner);
            registry_api::set_resolver(&env, &registry, &subdomain, Some(resolver.clone()));
            if let Some(target) = target.as_ref() {
                resolver_api::set_addr(&env, &resolver, &this, &subdomain, target);
            }
            if resolve_pubkey {
                resolver_api::set_pubkey(&env, &resolver, &this, &subdomain, &pubkey_x, &pubkey_y);
            }
            registry_api::set_owner(&env, &registry, &subdomain, Some(caller.clone()));
        } else {
            let owner = Some(caller.clone());
            registry_api::set_subnode_owner(&env, &registry, &domain, &label_hash, owner);
        }

        let account = SubdomainAccount {
            balance: config.price,
            creation_time: env.ledger().timestamp(),
            funds_owner: caller.clone(),
            released: false,
        };
        write_account(&env, &subdomain, &account);

        EvtSubdomainRegistered {
            namehash: subdomain.clone(),
            owner: caller,
            balance: config.price,
        }
        .publish(&env);

        subdomain
    }

    /// Gives the subdomain back and refunds its escrow to the funds owner
    /// once the release delay has passed since registration.
    pub fn release(env: Env, caller: Address, label_hash: BytesN<32>, domain: BytesN<32>) {
        ensure_initialized(&env);
        caller.require_auth();

        let subdomain = fold_hash(&env, &domain, &label_hash);
        let mut account = read_open_account(&env, &subdomain);
        if account.funds_owner != caller {
            panic_with_error!(&env, SubdomainRegistryError::NotFundsOwner);
        }
        let unlocked_at = account
            .creation_time
            .saturating_add(read_release_delay(&env));
        if env.ledger().timestamp() < unlocked_at {
            panic_with_error!(&env, SubdomainRegistryError::ReleaseDelayPending);
        }

        let this = env.current_contract_address();
        let registry = read_registry(&env);
        let controls_domain =
            registry_api::owner(&env, &registry, &domain).as_ref() == Some(&this);
        if controls_domain {
            let this_owner = Some(this.clone());
            registry_api::set_subnode_owner(&env, &registry, &domain, &label_hash, this_owner);
            registry_api::set_resolver(&env, &registry, &subdomain, None);
            registry_api::set_owner(&env, &registry, &subdomain, None);
        } else {
            log!(&env, "domain no longer owned, refunding escrow only", subdomain);
        }

        let amount = account.balance;
        account.balance = 0;
        account.released = true;
        write_account(&env, &subdomain, &account);

        if amount > 0 {
            TokenClient::new(&env, &read_token(&env)).transfer(&this, &caller, &amount);
        }

        EvtSubdomainReleased {
            namehash: subdomain,
            funds_owner: caller,
            amount,
        }
        .publish(&env);
    }

    /// Moves the right to release to whoever the registry now reports as
    /// the subdomain owner.
    pub fn update_funds_owner(
        env: Env,
        caller: Address,
        label_hash: BytesN<32>,
        domain: BytesN<32>,
    ) {
        ensure_initialized(&env);
        caller.require_auth();

        let registry = read_registry(&env);
        let subdomain = fold_hash(&env, &domain, &label_hash);
        if registry_api::owner(&env, &registry, &subdomain).as_ref() != Some(&caller) {
            panic_with_error!(&env, SubdomainRegistryError::NotNameOwner);
        }

        let mut account = read_open_account(&env, &subdomain);
        account.funds_owner = caller.clone();
        write_account(&env, &subdomain, &account);

        EvtFundsOwnerChanged {
            namehash: subdomain,
            funds_owner: caller,
        }
        .publish(&env);
    }

    /// Hands `domain` and its price over to `new_registry`. Accounts already
    /// registered here stay here.
    pub fn move_domain(env: Env, caller: Address, new_registry: Address, domain: BytesN<32>) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_controller(&env, &caller);
        if new_registry == env.current_contract_address() {
            panic_with_error!(&env, SubdomainRegistryError::InvalidParams);
        }

        let mut config = read_active_domain(&env, &domain);
        config.state = DomainState::Moved;
        write_domain(&env, &domain, &config);

        let registry = read_registry(&env);
        registry_api::set_owner(&env, &registry, &domain, Some(new_registry.clone()));
        SubdomainRegistryClient::new(&env, &new_registry).migrate_domain(&domain, &config.price);

        EvtDomainMoved {
            namehash: domain,
            new_registry,
        }
        .publish(&env);
    }

    /// Entry point for `move_domain` on the parent registry instance.
    pub fn migrate_domain(env: Env, domain: BytesN<32>, price: i128) {
        ensure_initialized(&env);
        let parent = read_parent_registry(&env)
            .unwrap_or_else(|| panic_with_error!(&env, SubdomainRegistryError::NotParentRegistry));
        parent.require_auth();
        ensure_valid_price(&env, price);

        let registry = read_registry(&env);
        if registry_api::owner(&env, &registry, &domain) != Some(env.current_contract_address()) {
            panic_with_error!(&env, SubdomainRegistryError::NotDomainOwner);
        }

        log!(&env, "domain migrated from parent registry", domain);
        let config = DomainConfig {
            state: DomainState::Active,
            price,
        };
        write_domain(&env, &domain, &config);
        EvtDomainPrice {
            namehash: domain,
            price,
        }
        .publish(&env);
    }

    pub fn get_account_balance(env: Env, subdomain: BytesN<32>) -> i128 {
        read_account(&env, &subdomain)
            .map(|account| account.balance)
            .unwrap_or(0)
    }

    pub fn get_funds_owner(env: Env, subdomain: BytesN<32>) -> Option<Address> {
        read_account(&env, &subdomain).map(|account| account.funds_owner)
    }

    pub fn get_creation_time(env: Env, subdomain: BytesN<32>) -> u64 {
        read_account(&env, &subdomain)
            .map(|account| account.creation_time)
            .unwrap_or(0)
    }

    pub fn account(env: Env, subdomain: BytesN<32>) -> Option<SubdomainAccount> {
        read_account(&env, &subdomain)
    }

    pub fn release_delay(env: Env) -> u64 {
        ensure_initialized(&env);
        read_release_delay(&env)
    }

    pub fn set_release_delay(env: Env, caller: Address, delay: u64) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_controller(&env, &caller);
        if delay == 0 {
            panic_with_error!(&env, SubdomainRegistryError::InvalidParams);
        }
        env.storage()
            .persistent()
            .set(&DataKey::ReleaseDelay, &delay);
    }

    pub fn controller(env: Env) -> Address {
        ensure_initialized(&env);
        read_controller(&env)
    }

    pub fn set_controller(env: Env, caller: Address, controller: Address) {
        ensure_initialized(&env);
        caller.require_auth();
        ensure_controller(&env, &caller);
        env.storage()
            .persistent()
            .set(&DataKey::Controller, &controller);
        EvtControllerChanged {
            previous: caller,
            controller,
        }
        .publish(&env);
    }

    pub fn token(env: Env) -> Address {
        read_token(&env)
    }

    pub fn registry(env: Env) -> Address {
        read_registry(&env)
    }

    pub fn resolver(env: Env) -> Address {
        read_resolver(&env)
    }

    pub fn parent_registry(env: Env) -> Option<Address> {
        read_parent_registry(&env)
    }
}
