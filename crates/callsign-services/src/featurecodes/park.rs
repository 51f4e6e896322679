//! Valet parking

use callsign_core::models::ParkingSlot;
use callsign_core::{AppError, AppResult};
use tracing::{debug, info, warn};

use super::{ExecutionContext, FeatureCodeService};
use crate::prompts::{
    CALL_PARKED_AT, ENTER_SLOT_NUMBER, INVALID_SLOT, NO_PARKING_SLOTS, SLOT_NOT_FOUND,
    SLOT_OCCUPIED,
};

impl FeatureCodeService {
    /// Slot number from the `slot` capture, action data, or the keypad.
    /// `Ok(None)` once the caller has heard the invalid-slot prompt.
    async fn slot_number(ctx: &mut ExecutionContext<'_>) -> AppResult<Option<i32>> {
        let entered = match ctx.parameter("slot") {
            Some(slot) => Some(slot),
            None => {
                ctx.call.playback(ENTER_SLOT_NUMBER).await?;
                ctx.call.read_digits(1, 4, "slot", 5000).await?
            }
        };

        match entered.as_deref().map(str::parse::<i32>) {
            Some(Ok(number)) => Ok(Some(number)),
            _ => {
                ctx.call.playback(INVALID_SLOT).await?;
                Ok(None)
            }
        }
    }

    /// Occupy the slot, announce it and light its lamp, then hand the caller
    /// to `valet_park`. Returns once the parked call leaves the lot.
    async fn park_in(
        &self,
        ctx: &mut ExecutionContext<'_>,
        slot: &ParkingSlot,
        announce: bool,
    ) -> AppResult<()> {
        self.repos
            .parking
            .occupy(slot.id, &ctx.uuid, &ctx.caller_id, &ctx.caller_name)
            .await?;

        let parked = self.hold_in_lot(ctx, slot.slot_number, announce).await;
        self.leave_slot(ctx, slot).await;
        parked
    }

    async fn hold_in_lot(
        &self,
        ctx: &mut ExecutionContext<'_>,
        number: i32,
        announce: bool,
    ) -> AppResult<()> {
        if announce {
            Self::announce_slot(ctx, number).await?;
        }
        self.effects
            .presence_in(&ParkingSlot::blf_user(number), &ctx.domain, "confirmed")
            .await;

        let timeout = ctx.code.park_timeout;
        let arg = format!(
            "{} {} in {} {} {}",
            ctx.domain, number, timeout, timeout, ctx.domain
        );
        ctx.call.execute_async("valet_park", &arg).await?;
        info!(uuid = %ctx.uuid, slot = number, caller = %ctx.caller_id, "Call parked");

        match ctx.call.wait_for_app("valet_park").await {
            Ok(event) => {
                debug!(uuid = %ctx.uuid, slot = number, event = %event, "Parked call left the lot");
                Ok(())
            }
            Err(AppError::CallHungUp(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Free the slot unless a retrieval or a newer park already took it over
    async fn leave_slot(&self, ctx: &mut ExecutionContext<'_>, slot: &ParkingSlot) {
        match self.repos.parking.release_held(slot.id, &ctx.uuid).await {
            Ok(true) => {
                self.effects
                    .presence_in(&ParkingSlot::blf_user(slot.slot_number), &ctx.domain, "terminated")
                    .await;
            }
            Ok(false) => debug!(uuid = %ctx.uuid, slot = slot.slot_number, "Slot already released"),
            Err(e) => warn!(uuid = %ctx.uuid, slot = slot.slot_number, error = %e, "Failed to release parking slot"),
        }
    }

    async fn announce_slot(ctx: &mut ExecutionContext<'_>, number: i32) -> AppResult<()> {
        ctx.call.playback(CALL_PARKED_AT).await?;
        let arg = format!("en number iterated {}", number);
        ctx.call.execute("say", &arg).await?;
        Ok(())
    }

    /// Park in the lowest free slot of the lot
    pub(super) async fn park(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let lot = ctx.code.lot_name().to_string();
        let Some(slot) = self.repos.parking.first_free(ctx.tenant_id, &lot).await? else {
            warn!(uuid = %ctx.uuid, lot = %lot, "No parking slots available");
            return ctx.call.playback(NO_PARKING_SLOTS).await;
        };

        let announce = ctx.code.park_announce;
        self.park_in(ctx, &slot, announce).await
    }

    /// Park in a named slot, creating the slot row on first use
    pub(super) async fn park_slot(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let Some(number) = Self::slot_number(ctx).await? else {
            return Ok(());
        };
        let lot = ctx.code.lot_name().to_string();

        let slot = match self
            .repos
            .parking
            .find_slot(ctx.tenant_id, &lot, number)
            .await?
        {
            Some(slot) => slot,
            None => {
                let new_slot = ParkingSlot {
                    tenant_id: ctx.tenant_id,
                    domain: ctx.domain.clone(),
                    lot_name: lot.clone(),
                    slot_number: number,
                    ..Default::default()
                };
                self.repos.parking.create_slot(&new_slot).await?
            }
        };

        if slot.is_occupied {
            return ctx.call.playback(SLOT_OCCUPIED).await;
        }

        self.park_in(ctx, &slot, true).await
    }

    pub(super) async fn park_retrieve(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let Some(number) = Self::slot_number(ctx).await? else {
            return Ok(());
        };
        let lot = ctx.code.lot_name().to_string();

        let slot = self
            .repos
            .parking
            .find_slot(ctx.tenant_id, &lot, number)
            .await?
            .filter(|s| s.is_occupied);
        let Some(slot) = slot else {
            return ctx.call.playback(SLOT_NOT_FOUND).await;
        };

        let arg = format!("{} {} out", ctx.domain, number);
        ctx.call.execute_async("valet_park", &arg).await?;
        self.repos.parking.release(slot.id).await?;

        self.effects
            .presence_in(&ParkingSlot::blf_user(number), &ctx.domain, "terminated")
            .await;
        info!(uuid = %ctx.uuid, slot = number, caller = %ctx.caller_id, "Retrieved parked call");

        // The retriever stays bridged to the parked call until one side hangs up
        match ctx.call.wait_for_app("valet_park").await {
            Ok(_) | Err(AppError::CallHungUp(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{code, context, harness};
    use super::*;
    use crate::testing::{strict_repositories, FakeCall};
    use crate::Repositories;
    use callsign_core::models::{FeatureAction, FeatureCode};
    use callsign_core::traits::MockParkingRepository;
    use callsign_esl::events::CHANNEL_STATE;
    use callsign_esl::EslEvent;
    use mockall::predicate::eq;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn slot(id: i64, number: i32, occupied: bool) -> ParkingSlot {
        ParkingSlot {
            id,
            tenant_id: 42,
            domain: "acme.example.com".to_string(),
            lot_name: "default".to_string(),
            slot_number: number,
            is_occupied: occupied,
            ..Default::default()
        }
    }

    fn park_code(action: FeatureAction) -> FeatureCode {
        FeatureCode {
            code_regex: Some(r"^\*5[79](?P<slot>\d{2})$".to_string()),
            park_timeout: 120,
            ..code("", action)
        }
    }

    #[tokio::test]
    async fn test_park_takes_first_free_slot_and_lights_lamp() {
        let mut parking = MockParkingRepository::new();
        parking
            .expect_first_free()
            .withf(|tenant, lot| *tenant == 42 && lot == "default")
            .returning(|_, _| Ok(Some(slot(7, 3, false))));
        parking
            .expect_occupy()
            .withf(|id, uuid, caller, name| {
                *id == 7 && uuid == "call-0001-uuid" && caller == "1001" && name == "Alice"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        parking
            .expect_release_held()
            .withf(|id, uuid| *id == 7 && uuid == "call-0001-uuid")
            .times(1)
            .returning(|_, _| Ok(true));
        let h = harness(Repositories {
            parking: Arc::new(parking),
            ..strict_repositories()
        });

        let mut call = FakeCall::new("1001", "*70", "acme.example.com", 42);
        let mut fc = code("*70", FeatureAction::Park);
        fc.park_timeout = 90;
        fc.park_announce = true;
        let mut ctx = context(&mut call, fc);
        h.service.park(&mut ctx).await.unwrap();

        assert_eq!(
            call.script(),
            vec![
                format!("playback {}", CALL_PARKED_AT),
                "say en number iterated 3".to_string(),
                "valet_park acme.example.com 3 in 90 90 acme.example.com".to_string(),
            ]
        );
        assert_eq!(
            h.switch.commands(),
            vec![
                "presence in park+*5703@acme.example.com|confirmed".to_string(),
                "presence in park+*5703@acme.example.com|terminated".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_slot_is_held_and_lit_while_call_is_parked() {
        let occupied = Arc::new(AtomicBool::new(false));
        let mut parking = MockParkingRepository::new();
        parking
            .expect_first_free()
            .returning(|_, _| Ok(Some(slot(7, 3, false))));
        let flag = occupied.clone();
        parking
            .expect_occupy()
            .times(1)
            .returning(move |_, _, _, _| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            });
        let flag = occupied.clone();
        parking
            .expect_release_held()
            .withf(|id, uuid| *id == 7 && uuid == "call-0001-uuid")
            .times(1)
            .returning(move |_, _| {
                flag.store(false, Ordering::SeqCst);
                Ok(true)
            });
        let h = harness(Repositories {
            parking: Arc::new(parking),
            ..strict_repositories()
        });

        let at_park = Arc::new(Mutex::new(Vec::new()));
        let (snapshot, flag, switch) = (at_park.clone(), occupied.clone(), h.switch.clone());
        let mut call = FakeCall::new("1001", "*70", "acme.example.com", 42)
            .with_blocking_app(
                "valet_park",
                vec![EslEvent::new()
                    .with_header("Event-Name", CHANNEL_STATE)
                    .with_header("Unique-ID", "call-0001-uuid")],
            )
            .on_app_start("valet_park", move || {
                snapshot
                    .lock()
                    .push((flag.load(Ordering::SeqCst), switch.commands()));
            })
            .with_hangup("NORMAL_CLEARING");
        let mut ctx = context(&mut call, code("*70", FeatureAction::Park));
        h.service.park(&mut ctx).await.unwrap();

        assert_eq!(
            *at_park.lock(),
            vec![(
                true,
                vec!["presence in park+*5703@acme.example.com|confirmed".to_string()]
            )]
        );
        assert!(!occupied.load(Ordering::SeqCst));
        assert_eq!(
            h.switch.commands().last().map(String::as_str),
            Some("presence in park+*5703@acme.example.com|terminated")
        );
    }

    #[tokio::test]
    async fn test_park_without_free_slot() {
        let mut parking = MockParkingRepository::new();
        parking.expect_first_free().returning(|_, _| Ok(None));
        let h = harness(Repositories {
            parking: Arc::new(parking),
            ..strict_repositories()
        });

        let mut call = FakeCall::new("1001", "*70", "acme.example.com", 42);
        let mut ctx = context(&mut call, code("*70", FeatureAction::Park));
        h.service.park(&mut ctx).await.unwrap();

        assert_eq!(call.played(), vec![NO_PARKING_SLOTS.to_string()]);
        assert!(h.switch.commands().is_empty());
    }

    #[tokio::test]
    async fn test_park_slot_creates_missing_slot() {
        let mut parking = MockParkingRepository::new();
        parking
            .expect_find_slot()
            .withf(|tenant, lot, n| *tenant == 42 && lot == "default" && *n == 5)
            .returning(|_, _, _| Ok(None));
        parking
            .expect_create_slot()
            .withf(|s| s.slot_number == 5 && s.domain == "acme.example.com" && !s.is_occupied)
            .returning(|s| Ok(ParkingSlot { id: 11, ..s.clone() }));
        parking
            .expect_occupy()
            .withf(|id, _, _, _| *id == 11)
            .returning(|_, _, _, _| Ok(()));
        // Retrieved before this call left the lot
        parking
            .expect_release_held()
            .withf(|id, _| *id == 11)
            .returning(|_, _| Ok(false));
        let h = harness(Repositories {
            parking: Arc::new(parking),
            ..strict_repositories()
        });

        let mut call = FakeCall::new("1001", "*5705", "acme.example.com", 42);
        let mut ctx = context(&mut call, park_code(FeatureAction::ParkSlot));
        h.service.park_slot(&mut ctx).await.unwrap();

        assert_eq!(call.played(), vec![CALL_PARKED_AT.to_string()]);
        assert_eq!(
            call.last().as_deref(),
            Some("valet_park acme.example.com 5 in 120 120 acme.example.com")
        );
        assert_eq!(
            h.switch.commands(),
            vec!["presence in park+*5705@acme.example.com|confirmed".to_string()]
        );
    }

    #[tokio::test]
    async fn test_park_slot_occupied() {
        let mut parking = MockParkingRepository::new();
        parking
            .expect_find_slot()
            .returning(|_, _, n| Ok(Some(slot(2, n, true))));
        let h = harness(Repositories {
            parking: Arc::new(parking),
            ..strict_repositories()
        });

        let mut call = FakeCall::new("1001", "*5702", "acme.example.com", 42);
        let mut ctx = context(&mut call, park_code(FeatureAction::ParkSlot));
        h.service.park_slot(&mut ctx).await.unwrap();

        assert_eq!(call.script(), vec![format!("playback {}", SLOT_OCCUPIED)]);
    }

    #[tokio::test]
    async fn test_park_slot_rejects_non_numeric_entry() {
        let h = harness(strict_repositories());
        let mut call = FakeCall::new("1001", "*57", "acme.example.com", 42).with_digits(&["*"]);
        let mut ctx = context(&mut call, code("*57", FeatureAction::ParkSlot));
        h.service.park_slot(&mut ctx).await.unwrap();

        assert_eq!(
            call.played(),
            vec![ENTER_SLOT_NUMBER.to_string(), INVALID_SLOT.to_string()]
        );
    }

    #[tokio::test]
    async fn test_retrieve_releases_slot_and_clears_lamp() {
        let mut parking = MockParkingRepository::new();
        parking
            .expect_find_slot()
            .returning(|_, _, n| Ok(Some(slot(4, n, true))));
        parking
            .expect_release()
            .with(eq(4))
            .times(1)
            .returning(|_| Ok(()));
        let h = harness(Repositories {
            parking: Arc::new(parking),
            ..strict_repositories()
        });

        let mut call = FakeCall::new("1002", "*5904", "acme.example.com", 42);
        let mut ctx = context(&mut call, park_code(FeatureAction::ParkRetrieve));
        h.service.park_retrieve(&mut ctx).await.unwrap();

        assert_eq!(call.script(), vec!["valet_park acme.example.com 4 out".to_string()]);
        assert_eq!(
            h.switch.commands(),
            vec!["presence in park+*5704@acme.example.com|terminated".to_string()]
        );
    }

    #[tokio::test]
    async fn test_retrieve_empty_slot() {
        let mut parking = MockParkingRepository::new();
        parking
            .expect_find_slot()
            .returning(|_, _, n| Ok(Some(slot(4, n, false))));
        let h = harness(Repositories {
            parking: Arc::new(parking),
            ..strict_repositories()
        });

        let mut call = FakeCall::new("1002", "*5904", "acme.example.com", 42);
        let mut ctx = context(&mut call, park_code(FeatureAction::ParkRetrieve));
        h.service.park_retrieve(&mut ctx).await.unwrap();

        assert_eq!(call.played(), vec![SLOT_NOT_FOUND.to_string()]);
        assert!(h.switch.commands().is_empty());
    }
}
