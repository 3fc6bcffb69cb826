//! Proportional purchase execution.
//!
//! A purchase debits the buyer by `price` and credits every stakeholder wallet
//! of the asset with `fraction * price`. All records are read and every
//! precondition is checked before the first write is staged, and each touched
//! wallet is written exactly once with its net delta applied. A buyer that is
//! also a stakeholder therefore keeps its share of the proceeds.

use tracing::{debug, info};

use crate::credential::authenticate;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::ChaincodeStub;
use crate::model::{Asset, Wallet, WalletName};
use crate::registry::{load_record, parse_price, require_args, write_record};

/// Balance changes computed for one purchase, in first-touch order.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementPlan {
    pub asset: String,
    pub price: f64,
    pub buyer: WalletName,
    wallets: Vec<(Wallet, f64)>,
}

impl SettlementPlan {
    /// Net change per wallet name.
    pub fn deltas(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.wallets.iter().map(|(w, d)| (w.name.as_str(), *d))
    }

    /// Wallet records as they will be written.
    pub fn settled(&self) -> impl Iterator<Item = Wallet> + '_ {
        self.wallets.iter().map(|(w, delta)| Wallet {
            balance: w.balance + delta,
            ..w.clone()
        })
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.wallets.iter().position(|(w, _)| w.name == name)
    }
}

/// Read phase: loads the asset, the buyer and every stakeholder wallet,
/// authenticates the buyer and accumulates deltas. Stages nothing.
pub fn plan_purchase(
    stub: &mut dyn ChaincodeStub,
    asset_name: &str,
    raw_price: &str,
    buyer_name: &str,
    buyer_secret: &str,
) -> LedgerResult<SettlementPlan> {
    let asset: Asset = load_record(stub, asset_name)?;
    let price = parse_price(raw_price)?;
    let buyer: Wallet = load_record(stub, buyer_name)?;

    if !authenticate(&buyer.credential_digest, buyer_secret) {
        return Err(LedgerError::Authentication(format!("wallet {buyer_name}")));
    }
    if !(price > 0.0 && buyer.balance >= price) {
        return Err(LedgerError::InsufficientFunds {
            wallet: buyer.name,
            available: buyer.balance,
            price,
        });
    }

    let mut plan = SettlementPlan {
        asset: asset.name.clone(),
        price,
        buyer: buyer.name.clone(),
        wallets: vec![(buyer, -price)],
    };
    for stakeholder in &asset.stakeholders {
        let share = stakeholder.fraction * price;
        match plan.position(&stakeholder.wallet) {
            Some(idx) => plan.wallets[idx].1 += share,
            None => {
                let wallet: Wallet = load_record(stub, &stakeholder.wallet)?;
                plan.wallets.push((wallet, share));
            }
        }
        debug!(asset = %asset.name, wallet = %stakeholder.wallet, share, "stakeholder share");
    }
    // A balance that overflows to inf would serialize as null and never decode again.
    if let Some(wallet) = plan.settled().find(|w| !w.balance.is_finite()) {
        return Err(LedgerError::Validation(format!(
            "settled balance of wallet {} is not finite",
            wallet.name
        )));
    }
    Ok(plan)
}

/// Write phase: stages every settled wallet through the stub.
pub fn apply_settlement(stub: &mut dyn ChaincodeStub, plan: &SettlementPlan) -> LedgerResult<()> {
    for wallet in plan.settled() {
        write_record(stub, &wallet)?;
    }
    Ok(())
}

/// `buyAsset(assetName, price, buyerWalletName, buyerSecret)`
pub fn buy_asset(stub: &mut dyn ChaincodeStub, args: &[String]) -> LedgerResult<()> {
    require_args(args, 4)?;
    let plan = plan_purchase(stub, &args[0], &args[1], &args[2], &args[3])?;
    apply_settlement(stub, &plan)?;
    info!(
        asset = %plan.asset,
        buyer = %plan.buyer,
        price = plan.price,
        wallets = plan.wallets.len(),
        "asset purchased"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::error::{ErrorKind, StoreError};
    use crate::ledger::MemoryLedger;
    use crate::model::Record;
    use crate::registry::{create_asset, create_wallet};

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn seed_wallet(ledger: &MemoryLedger, name: &str, secret: &str, balance: &str) {
        let mut tx = ledger.begin();
        create_wallet(&mut tx, &args(&[name, secret, "owner", balance])).unwrap();
        ledger.commit(tx).unwrap();
    }

    fn seed_asset(ledger: &MemoryLedger, name: &str, stakeholders: &str) {
        let mut tx = ledger.begin();
        create_asset(
            &mut tx,
            &LedgerConfig::default(),
            &args(&[name, "asset-pw", "studio", "info", stakeholders]),
        )
        .unwrap();
        ledger.commit(tx).unwrap();
    }

    fn balance(ledger: &MemoryLedger, name: &str) -> f64 {
        let bytes = ledger.committed(name).unwrap().unwrap();
        Wallet::decode(name, &bytes).unwrap().balance
    }

    fn buy(ledger: &MemoryLedger, argv: &[&str]) -> LedgerResult<()> {
        let mut tx = ledger.begin();
        buy_asset(&mut tx, &args(argv))?;
        ledger.commit(tx)?;
        Ok(())
    }

    /// A1 split 60/40 between W1 and W2; buyer B1 holds 100.
    fn two_way_market() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        seed_wallet(&ledger, "W1", "w1-pw", "0");
        seed_wallet(&ledger, "W2", "w2-pw", "0");
        seed_wallet(&ledger, "B1", "b1-pw", "100");
        seed_asset(
            &ledger,
            "A1",
            r#"[{"fraction":0.6,"walletAddress":"W1"},{"fraction":0.4,"walletAddress":"W2"}]"#,
        );
        ledger
    }

    fn assert_untouched(ledger: &MemoryLedger) {
        assert_eq!(balance(ledger, "B1"), 100.0);
        assert_eq!(balance(ledger, "W1"), 0.0);
        assert_eq!(balance(ledger, "W2"), 0.0);
    }

    #[test]
    fn purchase_splits_price_by_fraction() {
        let ledger = two_way_market();
        buy(&ledger, &["A1", "50", "B1", "b1-pw"]).unwrap();
        assert_eq!(balance(&ledger, "B1"), 50.0);
        assert_eq!(balance(&ledger, "W1"), 30.0);
        assert_eq!(balance(&ledger, "W2"), 20.0);
    }

    #[test]
    fn buyer_can_spend_entire_balance() {
        let ledger = two_way_market();
        buy(&ledger, &["A1", "100", "B1", "b1-pw"]).unwrap();
        assert_eq!(balance(&ledger, "B1"), 0.0);
    }

    #[test]
    fn non_positive_price_is_rejected_as_insufficient_funds() {
        let ledger = two_way_market();
        for price in ["0", "-5", "-0"] {
            let err = buy(&ledger, &["A1", price, "B1", "b1-pw"]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InsufficientFunds, "price {price}");
        }
        assert_untouched(&ledger);
    }

    #[test]
    fn padded_price_is_not_numeric() {
        let ledger = two_way_market();
        for price in [" 50 ", "50\n", "\t50"] {
            let err = buy(&ledger, &["A1", price, "B1", "b1-pw"]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "price {price:?}");
        }
        assert_untouched(&ledger);
    }

    #[test]
    fn share_overflowing_to_infinity_is_rejected_before_any_write() {
        let ledger = MemoryLedger::new();
        seed_wallet(&ledger, "W1", "w1-pw", "1.7e308");
        seed_wallet(&ledger, "W2", "w2-pw", "0");
        seed_wallet(&ledger, "B1", "b1-pw", "1.7e308");
        seed_asset(
            &ledger,
            "A1",
            r#"[{"fraction":0.6,"walletAddress":"W1"},{"fraction":0.4,"walletAddress":"W2"}]"#,
        );
        let height = ledger.height().unwrap();

        let err = buy(&ledger, &["A1", "1e308", "B1", "b1-pw"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ledger.height().unwrap(), height);
        assert_eq!(balance(&ledger, "W1"), 1.7e308);
        assert_eq!(balance(&ledger, "W2"), 0.0);
        assert_eq!(balance(&ledger, "B1"), 1.7e308);
    }

    #[test]
    fn overdraft_leaves_every_wallet_unchanged() {
        let ledger = two_way_market();
        let err = buy(&ledger, &["A1", "100.01", "B1", "b1-pw"]).unwrap_err();
        match err {
            LedgerError::InsufficientFunds {
                wallet,
                available,
                price,
            } => {
                assert_eq!(wallet, "B1");
                assert_eq!(available, 100.0);
                assert_eq!(price, 100.01);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_untouched(&ledger);
    }

    #[test]
    fn failures_are_reported_in_step_order() {
        let ledger = two_way_market();
        let cases: Vec<(&[&str], ErrorKind)> = vec![
            (&["A1", "50", "B1"][..], ErrorKind::Arity),
            (&["A1", "50", "", "b1-pw"][..], ErrorKind::EmptyArgument),
            (&["nope", "abc", "B1", "b1-pw"][..], ErrorKind::NotFound),
            (&["A1", "abc", "nobody", "b1-pw"][..], ErrorKind::Validation),
            (&["A1", "NaN", "B1", "b1-pw"][..], ErrorKind::Validation),
            (&["A1", "50", "nobody", "b1-pw"][..], ErrorKind::NotFound),
            (&["A1", "500", "B1", "wrong"][..], ErrorKind::Authentication),
        ];
        for (argv, kind) in cases {
            let err = buy(&ledger, argv).unwrap_err();
            assert_eq!(err.kind(), kind, "args {argv:?}");
        }
        assert_untouched(&ledger);
    }

    #[test]
    fn missing_stakeholder_wallet_aborts_before_any_write() {
        let ledger = two_way_market();
        seed_asset(
            &ledger,
            "A2",
            r#"[{"fraction":0.5,"walletAddress":"W1"},{"fraction":0.5,"walletAddress":"gone"}]"#,
        );
        let mut tx = ledger.begin();
        let err = buy_asset(&mut tx, &args(&["A2", "10", "B1", "b1-pw"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(tx.pending_writes(), 0);
        drop(tx);
        assert_untouched(&ledger);
    }

    #[test]
    fn buyer_who_is_also_a_stakeholder_keeps_their_share() {
        let ledger = two_way_market();
        seed_asset(
            &ledger,
            "A3",
            r#"[{"fraction":0.25,"walletAddress":"B1"},{"fraction":0.75,"walletAddress":"W1"}]"#,
        );
        buy(&ledger, &["A3", "40", "B1", "b1-pw"]).unwrap();
        assert_eq!(balance(&ledger, "B1"), 70.0);
        assert_eq!(balance(&ledger, "W1"), 30.0);
    }

    #[test]
    fn repeated_stakeholder_wallet_accumulates() {
        let ledger = two_way_market();
        seed_asset(
            &ledger,
            "A4",
            r#"[{"fraction":0.5,"walletAddress":"W2"},{"fraction":0.5,"walletAddress":"W2"}]"#,
        );
        let mut tx = ledger.begin();
        let plan = plan_purchase(&mut tx, "A4", "10", "B1", "b1-pw").unwrap();
        let deltas: Vec<(&str, f64)> = plan.deltas().collect();
        assert_eq!(deltas, vec![("B1", -10.0), ("W2", 10.0)]);
        apply_settlement(&mut tx, &plan).unwrap();
        assert_eq!(tx.pending_writes(), 2);
        ledger.commit(tx).unwrap();
        assert_eq!(balance(&ledger, "W2"), 10.0);
    }

    #[test]
    fn wallet_record_fields_other_than_balance_are_preserved() {
        let ledger = two_way_market();
        let before = Wallet::decode("W1", &ledger.committed("W1").unwrap().unwrap()).unwrap();
        buy(&ledger, &["A1", "10", "B1", "b1-pw"]).unwrap();
        let after = Wallet::decode("W1", &ledger.committed("W1").unwrap().unwrap()).unwrap();
        assert_eq!(after.owner, before.owner);
        assert_eq!(after.credential_digest, before.credential_digest);
        assert_eq!(after.balance, 6.0);
    }

    #[test]
    fn interleaved_purchases_on_one_buyer_commit_at_most_once() {
        let ledger = two_way_market();
        let mut first = ledger.begin();
        let mut second = ledger.begin();
        buy_asset(&mut first, &args(&["A1", "70", "B1", "b1-pw"])).unwrap();
        buy_asset(&mut second, &args(&["A1", "60", "B1", "b1-pw"])).unwrap();

        ledger.commit(first).unwrap();
        match ledger.commit(second) {
            Err(StoreError::Conflict { key, .. }) => assert_eq!(key, "B1"),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(balance(&ledger, "B1"), 30.0);
        assert_eq!(balance(&ledger, "W1"), 42.0);
        assert_eq!(balance(&ledger, "W2"), 28.0);
    }

    #[test]
    fn concurrent_overdrawing_purchases_never_go_negative() {
        let ledger = two_way_market();
        let outcomes: Vec<LedgerResult<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| buy(&ledger, &["A1", "60", "B1", "b1-pw"])))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(successes, 1);
        for outcome in &outcomes {
            if let Err(err) = outcome {
                assert!(
                    matches!(err.kind(), ErrorKind::Store | ErrorKind::InsufficientFunds),
                    "unexpected failure {err}"
                );
            }
        }
        assert_eq!(balance(&ledger, "B1"), 40.0);
        assert_eq!(balance(&ledger, "W1"), 36.0);
        assert_eq!(balance(&ledger, "W2"), 24.0);
    }
}
