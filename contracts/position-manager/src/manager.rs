//! Position Manager
//!
//! Hands out sequential position ids, each bound to its own derived ledger
//! account, and keeps a per-owner linked list of them. The manager acts on
//! the ledger as a whitelisted delegate of every account it created; users
//! act on positions through the manager, either as owner or as a delegate
//! the owner allowed for that position.
//!
//! Export and import move a whole position between a managed account and an
//! arbitrary ledger account. The external side must be the caller or must
//! have allowed the caller to migrate, and must have whitelisted the
//! manager on the ledger.

use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ausd_book_keeper::BookKeeper;
use ausd_common::{
    errors::{AusdError, AusdResult},
    events::{AusdEvent, EventLog},
    AccountId, Amount, PoolId, Position, PositionHandle, PositionId, Value,
};
use ausd_show_stopper::ShowStopper;

/// Neighbours of a position in its owner's list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PositionLink {
    pub prev: Option<PositionId>,
    pub next: Option<PositionId>,
}

/// Head, tail and length of an owner's list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct OwnerPositions {
    pub first: Option<PositionId>,
    pub last: Option<PositionId>,
    pub count: u64,
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    /// Ledger identity of the manager
    account: AccountId,
    last_position_id: u64,
    handles: BTreeMap<PositionId, PositionHandle>,
    links: BTreeMap<PositionId, PositionLink>,
    owners: BTreeMap<AccountId, OwnerPositions>,
    /// `(owner, position, delegate)`
    owner_whitelist: BTreeSet<(AccountId, PositionId, AccountId)>,
    /// `(owner, migrant)`: migrant may export to or import from owner's account
    migration_whitelist: BTreeSet<(AccountId, AccountId)>,
    events: EventLog,
}

impl PositionManager {
    pub fn new(account: AccountId) -> AusdResult<Self> {
        if account.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "position manager account is zero" });
        }
        Ok(Self {
            account,
            last_position_id: 0,
            handles: BTreeMap::new(),
            links: BTreeMap::new(),
            owners: BTreeMap::new(),
            owner_whitelist: BTreeSet::new(),
            migration_whitelist: BTreeSet::new(),
            events: EventLog::new(),
        })
    }

    // ============ Queries ============

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn last_position_id(&self) -> PositionId {
        PositionId(self.last_position_id)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn handle(&self, position_id: PositionId) -> AusdResult<PositionHandle> {
        self.handles
            .get(&position_id)
            .copied()
            .ok_or(AusdError::PositionNotFound { position_id })
    }

    /// Ledger position behind an id
    pub fn position(&self, book_keeper: &BookKeeper, position_id: PositionId) -> AusdResult<Position> {
        let handle = self.handle(position_id)?;
        Ok(book_keeper.position(&handle.pool_id, &handle.account))
    }

    pub fn owner_count(&self, owner: &AccountId) -> u64 {
        self.owners.get(owner).map(|o| o.count).unwrap_or_default()
    }

    pub fn first(&self, owner: &AccountId) -> Option<PositionId> {
        self.owners.get(owner).and_then(|o| o.first)
    }

    pub fn last(&self, owner: &AccountId) -> Option<PositionId> {
        self.owners.get(owner).and_then(|o| o.last)
    }

    pub fn link(&self, position_id: PositionId) -> Option<PositionLink> {
        self.links.get(&position_id).copied()
    }

    /// Ids of `owner`, oldest first
    pub fn owner_positions(&self, owner: &AccountId) -> Vec<PositionId> {
        let mut ids = Vec::new();
        let mut cursor = self.first(owner);
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.links.get(&id).and_then(|link| link.next);
        }
        ids
    }

    /// Caller is the owner or a delegate for this position
    pub fn is_position_allowed(&self, owner: &AccountId, position_id: PositionId, caller: &AccountId) -> bool {
        owner == caller || self.owner_whitelist.contains(&(*owner, position_id, *caller))
    }

    /// Caller is `owner` or allowed to migrate for it
    pub fn is_migration_allowed(&self, owner: &AccountId, caller: &AccountId) -> bool {
        owner == caller || self.migration_whitelist.contains(&(*owner, *caller))
    }

    fn allowed_handle(&self, position_id: PositionId, caller: &AccountId) -> AusdResult<PositionHandle> {
        let handle = self.handle(position_id)?;
        if !self.is_position_allowed(&handle.owner, position_id, caller) {
            return Err(AusdError::PositionNotAllowed { position_id, caller: *caller });
        }
        Ok(handle)
    }

    fn require_migration_allowed(&self, owner: &AccountId, caller: &AccountId) -> AusdResult<()> {
        if self.is_migration_allowed(owner, caller) {
            Ok(())
        } else {
            Err(AusdError::MigrationNotAllowed { owner: *owner, caller: *caller })
        }
    }

    // ============ Lifecycle ============

    /// Opens an empty position in `pool_id` for `owner`
    pub fn open(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        pool_id: &PoolId,
        owner: &AccountId,
    ) -> AusdResult<PositionId> {
        // 1. Inputs
        if owner.is_zero() {
            return Err(AusdError::InvalidAddress { reason: "position owner cannot be zero" });
        }
        book_keeper.pool_config().pool(pool_id)?;

        // 2. Allocate id and account
        let next_id = self.last_position_id.checked_add(1).ok_or(AusdError::Overflow)?;
        let position_id = PositionId(next_id);
        let account = position_id.derive_account(&self.account);

        // 3. The new account lets the manager act for it
        book_keeper.whitelist(&account, self.account)?;

        // 4. Register and append to the owner's list
        self.last_position_id = next_id;
        self.handles.insert(position_id, PositionHandle { pool_id: *pool_id, account, owner: *owner });

        let list = self.owners.entry(*owner).or_default();
        let prev = list.last;
        list.first = list.first.or(Some(position_id));
        list.last = Some(position_id);
        list.count += 1;
        if let Some(prev) = prev {
            self.links.entry(prev).or_default().next = Some(position_id);
        }
        self.links.insert(position_id, PositionLink { prev, next: None });

        info!(%position_id, %pool_id, %owner, %account, %caller, "position opened");
        self.events.emit(AusdEvent::PositionOpened {
            position_id,
            pool_id: *pool_id,
            owner: *owner,
            account,
        });
        Ok(position_id)
    }

    /// Locks or frees collateral and mints or repays debt on a position
    ///
    /// Collateral comes from and goes to the position account's free
    /// balance, and so does the stablecoin. Anyone may add collateral without
    /// touching debt; everything else needs the owner or a delegate.
    pub fn adjust_position(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        position_id: PositionId,
        collateral_delta: i128,
        debt_share_delta: i128,
        now: u64,
    ) -> AusdResult<()> {
        let pure_deposit = collateral_delta >= 0 && debt_share_delta == 0;
        let handle = if pure_deposit {
            self.handle(position_id)?
        } else {
            self.allowed_handle(position_id, caller)?
        };

        if book_keeper.live() {
            book_keeper.accrue_stability_fee(&handle.pool_id, now)?;
        }
        book_keeper.adjust_position(
            &self.account,
            &handle.pool_id,
            &handle.account,
            &handle.account,
            &handle.account,
            collateral_delta,
            debt_share_delta,
        )?;

        debug!(%position_id, %caller, collateral_delta, debt_share_delta, "managed position adjusted");
        Ok(())
    }

    /// Merges the whole of `src_id` into `dst_id`
    pub fn move_position(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        src_id: PositionId,
        dst_id: PositionId,
    ) -> AusdResult<()> {
        let src = self.allowed_handle(src_id, caller)?;
        let dst = self.allowed_handle(dst_id, caller)?;
        if src_id == dst_id {
            return Err(AusdError::SamePosition { account: src.account });
        }
        if src.pool_id != dst.pool_id {
            return Err(AusdError::NotSameCollateralPool { source: src.pool_id, destination: dst.pool_id });
        }
        self.move_whole(book_keeper, &src.pool_id, &src.account, &dst.account)
    }

    fn move_whole(
        &self,
        book_keeper: &mut BookKeeper,
        pool_id: &PoolId,
        src: &AccountId,
        dst: &AccountId,
    ) -> AusdResult<()> {
        let position = book_keeper.position(pool_id, src);
        book_keeper.move_position(
            &self.account,
            pool_id,
            src,
            dst,
            position.locked_collateral.to_delta()?,
            position.debt_share.to_delta()?,
        )
    }

    // ============ Transfers ============

    /// Sends free collateral of the position account to `dst`
    pub fn move_collateral(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        position_id: PositionId,
        dst: &AccountId,
        amount: Amount,
    ) -> AusdResult<()> {
        let handle = self.allowed_handle(position_id, caller)?;
        book_keeper.move_collateral(&self.account, &handle.pool_id, &handle.account, dst, amount)
    }

    /// Sends free collateral from one position account to another of the same pool
    pub fn move_collateral_between(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        src_id: PositionId,
        dst_id: PositionId,
        amount: Amount,
    ) -> AusdResult<()> {
        let src = self.allowed_handle(src_id, caller)?;
        let dst = self.handle(dst_id)?;
        if src.pool_id != dst.pool_id {
            return Err(AusdError::NotSameCollateralPool { source: src.pool_id, destination: dst.pool_id });
        }
        book_keeper.move_collateral(&self.account, &src.pool_id, &src.account, &dst.account, amount)
    }

    /// Sends ledger stablecoin of the position account to `dst`
    pub fn move_stablecoin(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        position_id: PositionId,
        dst: &AccountId,
        value: Value,
    ) -> AusdResult<()> {
        let handle = self.allowed_handle(position_id, caller)?;
        book_keeper.move_stablecoin(&self.account, &handle.account, dst, value)
    }

    // ============ Permissions ============

    /// Lets `delegate` manage one of the caller's positions
    pub fn allow_manage_position(
        &mut self,
        caller: &AccountId,
        position_id: PositionId,
        delegate: &AccountId,
        allowed: bool,
    ) -> AusdResult<()> {
        let handle = self.handle(position_id)?;
        if handle.owner != *caller {
            return Err(AusdError::PositionNotAllowed { position_id, caller: *caller });
        }
        let key = (handle.owner, position_id, *delegate);
        if allowed {
            self.owner_whitelist.insert(key);
        } else {
            self.owner_whitelist.remove(&key);
        }
        self.events.emit(AusdEvent::ManagePermissionChanged {
            owner: handle.owner,
            position_id,
            delegate: *delegate,
            allowed,
        });
        Ok(())
    }

    /// Lets `migrant` export into or import from the caller's account
    pub fn allow_migrate_position(&mut self, caller: &AccountId, migrant: &AccountId, allowed: bool) -> AusdResult<()> {
        let key = (*caller, *migrant);
        if allowed {
            self.migration_whitelist.insert(key);
        } else {
            self.migration_whitelist.remove(&key);
        }
        self.events.emit(AusdEvent::MigratePermissionChanged {
            owner: *caller,
            migrant: *migrant,
            allowed,
        });
        Ok(())
    }

    // ============ Migration ============

    /// Moves the whole position into an external ledger account
    pub fn export_position(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        position_id: PositionId,
        destination: &AccountId,
    ) -> AusdResult<()> {
        let handle = self.allowed_handle(position_id, caller)?;
        self.require_migration_allowed(destination, caller)?;
        self.move_whole(book_keeper, &handle.pool_id, &handle.account, destination)?;

        info!(%position_id, %destination, "position exported");
        self.events.emit(AusdEvent::PositionExported { position_id, destination: *destination });
        Ok(())
    }

    /// Moves the whole position of an external ledger account into `position_id`
    pub fn import_position(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        source: &AccountId,
        position_id: PositionId,
    ) -> AusdResult<()> {
        self.require_migration_allowed(source, caller)?;
        let handle = self.allowed_handle(position_id, caller)?;
        self.move_whole(book_keeper, &handle.pool_id, source, &handle.account)?;

        info!(%position_id, %source, "position imported");
        self.events.emit(AusdEvent::PositionImported { position_id, source: *source });
        Ok(())
    }

    // ============ Settlement ============

    /// Claims the leftover collateral of a settled position
    pub fn redeem_locked_collateral(
        &mut self,
        caller: &AccountId,
        book_keeper: &mut BookKeeper,
        show_stopper: &mut ShowStopper,
        position_id: PositionId,
        recipient: &AccountId,
    ) -> AusdResult<Amount> {
        let handle = self.allowed_handle(position_id, caller)?;
        show_stopper.redeem_locked_collateral(
            &self.account,
            book_keeper,
            &handle.pool_id,
            &handle.account,
            recipient,
        )
    }
}
