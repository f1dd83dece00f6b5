//! # Billing Ledger
//!
//! Command surface over subscriptions, payments and invoices. Entity rules
//! live on the domain types; this service loads, mutates and stores them.
//! Invoice writes are compare-and-swap on the stored version, so two callers
//! racing on the same invoice cannot both apply a payment to the same
//! balance. A completed payment is claimed before its invoice is credited,
//! so it settles at most one invoice once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use fleet_domain::billing::tax_for;
use fleet_domain::{
    Invoice, InvoiceStatus, Payment, PaymentMethod, PaymentType, Subscription,
};
use fleet_persistence::{InvoiceRepository, PaymentRepository, SubscriptionRepository};

use crate::error::{EngineError, Result};
use crate::events::{EventBus, FleetEvent};

/// Billing command service
pub struct BillingLedger {
    subscriptions: Arc<dyn SubscriptionRepository>,
    payments: Arc<dyn PaymentRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    /// Serializes payment claims, payment writes are not versioned
    settlements: Mutex<()>,
    events: EventBus,
}

impl BillingLedger {
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        payments: Arc<dyn PaymentRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        events: EventBus,
    ) -> Self {
        Self {
            subscriptions,
            payments,
            invoices,
            settlements: Mutex::new(()),
            events,
        }
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    pub async fn subscription(&self, company_id: Uuid) -> Result<Subscription> {
        self.subscriptions
            .get_by_company(company_id)
            .await?
            .ok_or_else(|| EngineError::not_found("subscription", company_id))
    }

    pub async fn create_subscription(&self, subscription: Subscription) -> Result<Subscription> {
        self.subscriptions.create(&subscription).await?;
        tracing::info!(
            company_id = %subscription.company_id,
            plan = ?subscription.plan,
            end_date = %subscription.end_date,
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Whether the company may register one more vehicle. An inactive or
    /// expired subscription allows nothing.
    pub async fn can_add_vehicle(&self, company_id: Uuid, current: u32, now: DateTime<Utc>) -> Result<bool> {
        let sub = self.subscription(company_id).await?;
        Ok(sub.is_subscription_active(now) && sub.can_add_vehicle(current))
    }

    pub async fn can_add_driver(&self, company_id: Uuid, current: u32, now: DateTime<Utc>) -> Result<bool> {
        let sub = self.subscription(company_id).await?;
        Ok(sub.is_subscription_active(now) && sub.can_add_driver(current))
    }

    pub async fn can_add_user(&self, company_id: Uuid, current: u32, now: DateTime<Utc>) -> Result<bool> {
        let sub = self.subscription(company_id).await?;
        Ok(sub.is_subscription_active(now) && sub.can_add_user(current))
    }

    pub async fn suspend_subscription(&self, company_id: Uuid, now: DateTime<Utc>) -> Result<Subscription> {
        let mut sub = self.subscription(company_id).await?;
        sub.suspend(now)?;
        self.subscriptions.update(&sub).await?;
        tracing::warn!(company_id = %company_id, "Subscription suspended");
        Ok(sub)
    }

    pub async fn reactivate_subscription(&self, company_id: Uuid, now: DateTime<Utc>) -> Result<Subscription> {
        let mut sub = self.subscription(company_id).await?;
        sub.reactivate(now)?;
        self.subscriptions.update(&sub).await?;
        tracing::info!(company_id = %company_id, "Subscription reactivated");
        Ok(sub)
    }

    pub async fn cancel_subscription(&self, company_id: Uuid, now: DateTime<Utc>) -> Result<Subscription> {
        let mut sub = self.subscription(company_id).await?;
        sub.cancel(now)?;
        self.subscriptions.update(&sub).await?;
        tracing::info!(company_id = %company_id, "Subscription cancelled");
        Ok(sub)
    }

    // =========================================================================
    // PAYMENTS
    // =========================================================================

    pub async fn payment(&self, payment_id: Uuid) -> Result<Payment> {
        self.payments
            .get_by_id(payment_id)
            .await?
            .ok_or_else(|| EngineError::not_found("payment", payment_id))
    }

    pub async fn create_payment(
        &self,
        company_id: Uuid,
        amount: Decimal,
        tax_amount: Decimal,
        method: PaymentMethod,
        payment_type: PaymentType,
        now: DateTime<Utc>,
    ) -> Result<Payment> {
        let payment = Payment::new(company_id, amount, tax_amount, method, payment_type, now)?;
        self.payments.create(&payment).await?;
        tracing::info!(
            payment_id = %payment.id,
            company_id = %company_id,
            total = %payment.total_amount,
            method = method.as_str(),
            "Payment created"
        );
        Ok(payment)
    }

    async fn transition_payment<F>(&self, payment_id: Uuid, apply: F) -> Result<Payment>
    where
        F: FnOnce(&mut Payment) -> fleet_domain::Result<()> + Send,
    {
        let mut payment = self.payment(payment_id).await?;
        let from = payment.status;
        apply(&mut payment)?;
        self.payments.update(&payment).await?;
        tracing::info!(
            payment_id = %payment_id,
            from = from.as_str(),
            to = payment.status.as_str(),
            "Payment status changed"
        );
        Ok(payment)
    }

    pub async fn start_processing(&self, payment_id: Uuid, now: DateTime<Utc>) -> Result<Payment> {
        self.transition_payment(payment_id, |p| p.start_processing(now)).await
    }

    pub async fn complete_payment(
        &self,
        payment_id: Uuid,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Payment> {
        self.transition_payment(payment_id, |p| p.complete(external_id, now))
            .await
    }

    /// Fail a payment. The reason must be non-empty.
    pub async fn mark_failed(&self, payment_id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Payment> {
        let payment = self
            .transition_payment(payment_id, |p| p.fail(reason, now))
            .await?;
        tracing::warn!(payment_id = %payment_id, reason, "Payment failed");
        Ok(payment)
    }

    pub async fn cancel_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> Result<Payment> {
        self.transition_payment(payment_id, |p| p.cancel(now)).await
    }

    pub async fn refund_payment(&self, payment_id: Uuid, now: DateTime<Utc>) -> Result<Payment> {
        self.transition_payment(payment_id, |p| p.refund(now)).await
    }

    // =========================================================================
    // INVOICES
    // =========================================================================

    pub async fn invoice(&self, invoice_id: Uuid) -> Result<Invoice> {
        Ok(self.load_invoice(invoice_id).await?.1)
    }

    async fn load_invoice(&self, invoice_id: Uuid) -> Result<(u64, Invoice)> {
        self.invoices
            .get_by_id(invoice_id)
            .await?
            .map(|v| (v.version, v.entity))
            .ok_or_else(|| EngineError::not_found("invoice", invoice_id))
    }

    /// Load, mutate and write an invoice once. A concurrent write in between
    /// surfaces as `ConcurrentUpdateConflict`.
    async fn mutate_invoice<F>(&self, invoice_id: Uuid, apply: F) -> Result<Invoice>
    where
        F: FnOnce(&mut Invoice) -> fleet_domain::Result<()> + Send,
    {
        let (version, mut invoice) = self.load_invoice(invoice_id).await?;
        apply(&mut invoice)?;
        self.invoices.update(&invoice, version).await?;
        Ok(invoice)
    }

    fn settled(&self, invoice: &Invoice, now: DateTime<Utc>) {
        tracing::info!(
            invoice_id = %invoice.id,
            number = %invoice.invoice_number,
            paid = %invoice.paid_amount,
            balance = %invoice.balance_amount,
            status = invoice.status.as_str(),
            "Invoice payment applied"
        );
        if invoice.is_paid() {
            self.events.publish(FleetEvent::InvoicePaid {
                invoice_id: invoice.id,
                company_id: invoice.company_id,
                at: now,
            });
        }
    }

    pub async fn create_invoice(
        &self,
        company_id: Uuid,
        invoice_number: &str,
        subtotal: Decimal,
        tax_amount: Decimal,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let invoice = Invoice::new(company_id, invoice_number, subtotal, tax_amount, due_date, now)?;
        self.invoices.create(&invoice).await?;
        tracing::info!(
            invoice_id = %invoice.id,
            number = invoice_number,
            total = %invoice.total_amount,
            "Invoice created"
        );
        Ok(invoice)
    }

    /// Draft an invoice for one month of the company's subscription, taxed at
    /// the subscription's rate.
    pub async fn bill_subscription(
        &self,
        company_id: Uuid,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let sub = self.subscription(company_id).await?;
        let subtotal = sub.monthly_price();
        let tax = tax_for(subtotal, sub.tax_rate);
        let number = format!("INV-{}-{}", now.format("%Y%m"), &sub.id.simple().to_string()[..8]);

        let mut invoice = Invoice::new(company_id, number, subtotal, tax, due_date, now)?;
        invoice.subscription_id = Some(sub.id);
        invoice.tax_rate = sub.tax_rate;
        invoice.currency.clone_from(&sub.currency);
        invoice.billing_period_start = Some(now);
        invoice.billing_period_end = Some(now + chrono::Months::new(1));

        self.invoices.create(&invoice).await?;
        tracing::info!(
            invoice_id = %invoice.id,
            company_id = %company_id,
            total = %invoice.total_amount,
            "Subscription invoice drafted"
        );
        Ok(invoice)
    }

    pub async fn send_invoice(&self, invoice_id: Uuid, now: DateTime<Utc>) -> Result<Invoice> {
        self.mutate_invoice(invoice_id, |inv| inv.mark_sent(now)).await
    }

    pub async fn cancel_invoice(&self, invoice_id: Uuid, now: DateTime<Utc>) -> Result<Invoice> {
        let invoice = self.mutate_invoice(invoice_id, |inv| inv.cancel(now)).await?;
        tracing::info!(invoice_id = %invoice_id, "Invoice cancelled");
        Ok(invoice)
    }

    /// Apply `amount` to the invoice in a single compare-and-swap attempt.
    pub async fn apply_payment(
        &self,
        invoice_id: Uuid,
        amount: Decimal,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let invoice = self
            .mutate_invoice(invoice_id, |inv| inv.apply_payment(amount, method, now))
            .await?;
        self.settled(&invoice, now);
        Ok(invoice)
    }

    /// [`apply_payment`](Self::apply_payment), re-reading and retrying on a
    /// lost race up to `max_attempts` times. Domain rejections are not
    /// retried.
    pub async fn apply_payment_with_retry(
        &self,
        invoice_id: Uuid,
        amount: Decimal,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
        max_attempts: usize,
    ) -> Result<Invoice> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.apply_payment(invoice_id, amount, method, now).await {
                Err(e) if e.is_conflict() && attempt < max_attempts => {
                    tracing::warn!(invoice_id = %invoice_id, attempt, "Invoice write conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Apply a completed payment's total to an invoice and link the two.
    /// The payment is claimed first and released again if the invoice
    /// refuses it, so a payment that already settled an invoice is rejected.
    pub async fn apply_completed_payment(
        &self,
        invoice_id: Uuid,
        payment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let _settling = self.settlements.lock().await;
        let payment = self.payment(payment_id).await?;

        let mut claimed = payment.clone();
        claimed.link_invoice(invoice_id, now)?;
        self.payments.update(&claimed).await?;

        match self
            .mutate_invoice(invoice_id, |inv| inv.apply_completed_payment(&payment, now))
            .await
        {
            Ok(invoice) => {
                tracing::info!(payment_id = %payment_id, invoice_id = %invoice_id, "Payment settled invoice");
                self.settled(&invoice, now);
                Ok(invoice)
            }
            Err(e) => {
                if let Err(release) = self.payments.update(&payment).await {
                    tracing::error!(
                        payment_id = %payment_id,
                        invoice_id = %invoice_id,
                        error = %release,
                        "Payment claim not released"
                    );
                }
                Err(e)
            }
        }
    }

    /// Move every sent invoice past its due date to overdue. Returns the ids
    /// that moved. Invoices changed concurrently are left for the next run.
    pub async fn refresh_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let mut moved = Vec::new();
        for versioned in self.invoices.get_by_status(InvoiceStatus::Sent).await? {
            let mut invoice = versioned.entity;
            if !invoice.mark_overdue(now) {
                continue;
            }
            match self.invoices.update(&invoice, versioned.version).await {
                Ok(_) => {
                    tracing::info!(
                        invoice_id = %invoice.id,
                        days_overdue = invoice.days_overdue(now),
                        "Invoice overdue"
                    );
                    moved.push(invoice.id);
                }
                Err(e) if e.is_conflict() => {
                    tracing::warn!(invoice_id = %invoice.id, "Skipped overdue refresh, invoice changed concurrently");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fleet_domain::{
        BillingCycle, DomainError, PaymentStatus, PlanLimits, SubscriptionPlan,
    };
    use fleet_persistence::InMemoryStore;
    use rust_decimal_macros::dec;

    fn ledger() -> (Arc<InMemoryStore>, BillingLedger) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = BillingLedger::new(store.clone(), store.clone(), store.clone(), EventBus::new(16));
        (store, ledger)
    }

    async fn invoice(ledger: &BillingLedger, now: DateTime<Utc>) -> Invoice {
        ledger
            .create_invoice(
                Uuid::new_v4(),
                "INV-0001",
                dec!(100000),
                dec!(11000),
                now + Duration::days(14),
                now,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_then_full_payment() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let mut rx = ledger.events.subscribe();
        let inv = invoice(&ledger, now).await;
        assert_eq!(inv.total_amount, dec!(111000));

        let inv = ledger.apply_payment(inv.id, dec!(50000), None, now).await.unwrap();
        assert_eq!(inv.paid_amount, dec!(50000));
        assert_eq!(inv.balance_amount, dec!(61000));
        assert!(!inv.is_paid());

        let inv = ledger
            .apply_payment(inv.id, dec!(61000), Some(PaymentMethod::Qris), now)
            .await
            .unwrap();
        assert_eq!(inv.balance_amount, Decimal::ZERO);
        assert_eq!(inv.status, InvoiceStatus::Paid);

        match rx.recv().await.unwrap() {
            FleetEvent::InvoicePaid { invoice_id, .. } => assert_eq!(invoice_id, inv.id),
            other => panic!("unexpected event {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_overpayment_rejected_without_change() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let inv = invoice(&ledger, now).await;

        let err = ledger
            .apply_payment(inv.id, dec!(200000), None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::InvariantViolation(_))));
        assert_eq!(ledger.invoice(inv.id).await.unwrap().paid_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_stale_write_is_a_conflict() {
        let (store, ledger) = ledger();
        let now = Utc::now();
        let inv = invoice(&ledger, now).await;

        // Another writer bumps the version underneath a stale copy
        let stale = InvoiceRepository::get_by_id(store.as_ref(), inv.id).await.unwrap().unwrap();
        ledger.apply_payment(inv.id, dec!(1000), None, now).await.unwrap();

        let mut copy = stale.entity;
        copy.apply_payment(dec!(1000), None, now).unwrap();
        let err = InvoiceRepository::update(store.as_ref(), &copy, stale.version)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(ledger.invoice(inv.id).await.unwrap().paid_amount, dec!(1000));
    }

    #[tokio::test]
    async fn test_concurrent_payments_with_retry_all_land() {
        let (_, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let now = Utc::now();
        let inv = invoice(&ledger, now).await;
        let invoice_id = inv.id;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .apply_payment_with_retry(invoice_id, dec!(1000), None, now, 50)
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = ledger.invoice(inv.id).await.unwrap();
        assert_eq!(stored.paid_amount, dec!(10000));
        assert_eq!(stored.balance_amount, stored.total_amount - stored.paid_amount);
    }

    #[tokio::test]
    async fn test_payment_lifecycle_and_completed_application() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let inv = invoice(&ledger, now).await;

        let payment = ledger
            .create_payment(
                inv.company_id,
                dec!(100000),
                dec!(11000),
                PaymentMethod::BankTransfer,
                PaymentType::Invoice,
                now,
            )
            .await
            .unwrap();
        assert_eq!(payment.total_amount, dec!(111000));
        assert_eq!(payment.status, PaymentStatus::Pending);

        // Pending payments cannot settle an invoice
        assert!(ledger.apply_completed_payment(inv.id, payment.id, now).await.is_err());

        ledger.start_processing(payment.id, now).await.unwrap();
        ledger.complete_payment(payment.id, "TRX-42", now).await.unwrap();

        let inv = ledger.apply_completed_payment(inv.id, payment.id, now).await.unwrap();
        assert!(inv.is_paid());
        assert_eq!(inv.payment_id, Some(payment.id));
        assert_eq!(inv.payment_reference.as_deref(), Some("TRX-42"));

        let refunded = ledger.refund_payment(payment.id, now).await.unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
    }

    async fn completed(ledger: &BillingLedger, company_id: Uuid, amount: Decimal, now: DateTime<Utc>) -> Payment {
        let payment = ledger
            .create_payment(company_id, amount, Decimal::ZERO, PaymentMethod::Qris, PaymentType::Invoice, now)
            .await
            .unwrap();
        ledger.complete_payment(payment.id, "QR-7", now).await.unwrap()
    }

    #[tokio::test]
    async fn test_completed_payment_applies_once() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let inv = invoice(&ledger, now).await;
        let payment = completed(&ledger, inv.company_id, dec!(50000), now).await;

        let first = ledger.apply_completed_payment(inv.id, payment.id, now).await.unwrap();
        assert_eq!(first.paid_amount, dec!(50000));

        let err = ledger
            .apply_completed_payment(inv.id, payment.id, now)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVARIANT_VIOLATION");

        let stored = ledger.invoice(inv.id).await.unwrap();
        assert_eq!(stored.paid_amount, dec!(50000));
        assert_eq!(stored.balance_amount, dec!(61000));
        assert_eq!(ledger.payment(payment.id).await.unwrap().invoice_id, Some(inv.id));
    }

    #[tokio::test]
    async fn test_completed_payment_cannot_move_to_another_invoice() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let first = invoice(&ledger, now).await;
        let second = ledger
            .create_invoice(first.company_id, "INV-0002", dec!(100000), dec!(11000), now + Duration::days(14), now)
            .await
            .unwrap();
        let payment = completed(&ledger, first.company_id, dec!(50000), now).await;

        ledger.apply_completed_payment(first.id, payment.id, now).await.unwrap();
        assert!(ledger.apply_completed_payment(second.id, payment.id, now).await.is_err());
        assert_eq!(ledger.invoice(second.id).await.unwrap().paid_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_refused_payment_is_released() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let small = invoice(&ledger, now).await;
        let payment = completed(&ledger, small.company_id, dec!(500000), now).await;

        // Larger than the balance, the invoice refuses and the claim is undone
        assert!(ledger.apply_completed_payment(small.id, payment.id, now).await.is_err());
        assert_eq!(ledger.payment(payment.id).await.unwrap().invoice_id, None);

        let big = ledger
            .create_invoice(small.company_id, "INV-0003", dec!(500000), Decimal::ZERO, now + Duration::days(14), now)
            .await
            .unwrap();
        let paid = ledger.apply_completed_payment(big.id, payment.id, now).await.unwrap();
        assert!(paid.is_paid());
    }

    #[tokio::test]
    async fn test_concurrent_settlements_apply_payment_once() {
        let (_, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let now = Utc::now();
        let inv = invoice(&ledger, now).await;
        let payment = completed(&ledger, inv.company_id, dec!(10000), now).await;
        let (invoice_id, payment_id) = (inv.id, payment.id);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.apply_completed_payment(invoice_id, payment_id, now).await
            }));
        }
        let mut applied = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(ledger.invoice(inv.id).await.unwrap().paid_amount, dec!(10000));
    }

    #[tokio::test]
    async fn test_zero_invoice_is_paid_on_send() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let inv = ledger
            .create_invoice(Uuid::new_v4(), "INV-FREE", Decimal::ZERO, Decimal::ZERO, now + Duration::days(14), now)
            .await
            .unwrap();
        let sent = ledger.send_invoice(inv.id, now).await.unwrap();
        assert_eq!(sent.status, InvoiceStatus::Paid);
        assert!(ledger.refresh_overdue(now + Duration::days(30)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failed_requires_reason() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let payment = ledger
            .create_payment(Uuid::new_v4(), dec!(10), dec!(0), PaymentMethod::EWallet, PaymentType::TopUp, now)
            .await
            .unwrap();

        assert!(ledger.mark_failed(payment.id, "", now).await.is_err());
        assert_eq!(ledger.payment(payment.id).await.unwrap().status, PaymentStatus::Pending);

        let failed = ledger.mark_failed(payment.id, "card declined", now).await.unwrap();
        assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    }

    #[tokio::test]
    async fn test_refresh_overdue_only_moves_sent() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let sent = invoice(&ledger, now).await;
        let draft = invoice(&ledger, now).await;
        ledger.send_invoice(sent.id, now).await.unwrap();

        let later = now + Duration::days(20);
        let moved = ledger.refresh_overdue(later).await.unwrap();
        assert_eq!(moved, vec![sent.id]);
        assert_eq!(ledger.invoice(sent.id).await.unwrap().status, InvoiceStatus::Overdue);
        assert_eq!(ledger.invoice(draft.id).await.unwrap().status, InvoiceStatus::Draft);

        // Overdue invoices still accept payment
        let paid = ledger.apply_payment(sent.id, dec!(111000), None, later).await.unwrap();
        assert!(paid.is_paid());
        assert!(ledger.cancel_invoice(sent.id, later).await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_limits_and_billing() {
        let (_, ledger) = ledger();
        let now = Utc::now();
        let company_id = Uuid::new_v4();
        let limits = PlanLimits {
            max_vehicles: 2,
            max_drivers: 3,
            max_users: 1,
        };
        ledger
            .create_subscription(Subscription::new(
                company_id,
                SubscriptionPlan::Basic,
                BillingCycle::Monthly,
                limits,
                dec!(100000),
                now,
                now + Duration::days(30),
            ))
            .await
            .unwrap();

        assert!(ledger.can_add_vehicle(company_id, 1, now).await.unwrap());
        assert!(!ledger.can_add_vehicle(company_id, 2, now).await.unwrap());
        assert!(ledger.can_add_driver(company_id, 2, now).await.unwrap());
        assert!(!ledger.can_add_user(company_id, 1, now).await.unwrap());

        ledger.suspend_subscription(company_id, now).await.unwrap();
        assert!(!ledger.can_add_vehicle(company_id, 0, now).await.unwrap());
        ledger.reactivate_subscription(company_id, now).await.unwrap();

        let inv = ledger
            .bill_subscription(company_id, now + Duration::days(7), now)
            .await
            .unwrap();
        assert_eq!(inv.subtotal, dec!(100000));
        assert_eq!(inv.total_amount, dec!(111000));
        assert!(inv.subscription_id.is_some());
    }
}
