//! # Billing
//!
//! Subscriptions, payments and invoices. All money is `Decimal`.
//!
//! ## Invariants
//!
//! - `Payment::total_amount == amount + tax_amount`, fixed at creation.
//! - `Invoice::total_amount == subtotal + tax_amount`.
//! - `Invoice::balance_amount == total_amount - paid_amount` after every
//!   payment application, and status is `Paid` iff the balance is `<= 0`.
//! - Status machines only move forward. The one exit from a terminal payment
//!   state is `Completed -> Refunded`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, Result};

/// Indonesian VAT, in percent.
pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(1100, 0, 0, false, 2);

pub const DEFAULT_CURRENCY: &str = "IDR";

/// Tax owed on `subtotal` at `rate_pct` percent, rounded to cents.
#[must_use]
pub fn tax_for(subtotal: Decimal, rate_pct: Decimal) -> Decimal {
    (subtotal * rate_pct / Decimal::ONE_HUNDRED).round_dp(2)
}

/// `"Rp 111000.00"` for IDR, `"<CUR> <amount>"` otherwise.
#[must_use]
pub fn format_currency(amount: Decimal, currency: &str) -> String {
    match currency {
        "IDR" => format!("Rp {:.2}", amount.round_dp(2)),
        other => format!("{other} {:.2}", amount.round_dp(2)),
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Basic,
    Premium,
    Enterprise,
}

/// Plan quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_vehicles: u32,
    pub max_drivers: u32,
    pub max_users: u32,
}

/// A company's plan and billing window `[start_date, end_date)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub company_id: Uuid,

    pub plan: SubscriptionPlan,
    pub billing_cycle: BillingCycle,
    pub limits: PlanLimits,

    // Pricing
    pub price: Decimal,
    pub currency: String,
    pub tax_rate: Decimal,

    // Status
    pub status: SubscriptionStatus,
    pub is_active: bool,

    // Billing period
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub next_billing_date: DateTime<Utc>,
    pub auto_renew: bool,

    #[serde(default)]
    pub features: BTreeMap<String, bool>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    #[must_use]
    pub fn new(
        company_id: Uuid,
        plan: SubscriptionPlan,
        billing_cycle: BillingCycle,
        limits: PlanLimits,
        price: Decimal,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            plan,
            billing_cycle,
            limits,
            price,
            currency: DEFAULT_CURRENCY.to_string(),
            tax_rate: DEFAULT_TAX_RATE,
            status: SubscriptionStatus::Active,
            is_active: true,
            start_date,
            end_date,
            next_billing_date: end_date,
            auto_renew: false,
            features: BTreeMap::new(),
            created_at: start_date,
            updated_at: start_date,
        }
    }

    #[must_use]
    pub fn is_subscription_active(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.status == SubscriptionStatus::Active && now < self.end_date
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_date
    }

    /// Whole days left in the window, 0 once expired.
    #[must_use]
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        if self.is_expired(now) {
            return 0;
        }
        (self.end_date - now).num_days()
    }

    #[must_use]
    pub fn monthly_price(&self) -> Decimal {
        match self.billing_cycle {
            BillingCycle::Monthly => self.price,
            BillingCycle::Yearly => (self.price / Decimal::from(12)).round_dp(2),
        }
    }

    #[must_use]
    pub const fn can_add_vehicle(&self, current: u32) -> bool {
        current < self.limits.max_vehicles
    }

    #[must_use]
    pub const fn can_add_driver(&self, current: u32) -> bool {
        current < self.limits.max_drivers
    }

    #[must_use]
    pub const fn can_add_user(&self, current: u32) -> bool {
        current < self.limits.max_users
    }

    #[must_use]
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    fn transition(&mut self, to: SubscriptionStatus, now: DateTime<Utc>) -> Result<()> {
        use SubscriptionStatus::{Active, Cancelled, Expired, Suspended};
        let allowed = matches!(
            (self.status, to),
            (Active, Suspended | Cancelled | Expired) | (Suspended, Active | Cancelled | Expired)
        );
        if !allowed {
            return Err(DomainError::transition(
                "subscription",
                self.status.as_str(),
                to.as_str(),
            ));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn suspend(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SubscriptionStatus::Suspended, now)
    }

    pub fn reactivate(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SubscriptionStatus::Active, now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SubscriptionStatus::Cancelled, now)?;
        self.auto_renew = false;
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SubscriptionStatus::Expired, now)
    }
}

// =============================================================================
// PAYMENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Processing | Self::Completed | Self::Failed | Self::Cancelled)
                | (Self::Processing, Self::Completed | Self::Failed | Self::Cancelled)
                | (Self::Completed, Self::Refunded)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Qris,
    BankTransfer,
    EWallet,
    CreditCard,
}

impl PaymentMethod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Qris => "qris",
            Self::BankTransfer => "bank_transfer",
            Self::EWallet => "e_wallet",
            Self::CreditCard => "credit_card",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Subscription,
    Invoice,
    TopUp,
}

/// A payment transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub company_id: Uuid,
    pub subscription_id: Option<Uuid>,
    /// Invoice this payment settled. A payment settles at most one invoice.
    pub invoice_id: Option<Uuid>,

    // Amounts
    pub amount: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,

    pub method: PaymentMethod,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,

    // Gateway references
    pub external_id: Option<String>,
    pub failure_reason: Option<String>,

    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Pending payment with `total = amount + tax`. Negative amounts are
    /// rejected.
    pub fn new(
        company_id: Uuid,
        amount: Decimal,
        tax_amount: Decimal,
        method: PaymentMethod,
        payment_type: PaymentType,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if amount.is_sign_negative() || tax_amount.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "payment amounts must be non-negative (amount {amount}, tax {tax_amount})"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            company_id,
            subscription_id: None,
            invoice_id: None,
            amount,
            tax_amount,
            total_amount: amount + tax_amount,
            currency: DEFAULT_CURRENCY.to_string(),
            method,
            payment_type,
            status: PaymentStatus::Pending,
            external_id: None,
            failure_reason: None,
            initiated_at: now,
            completed_at: None,
            expires_at: None,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    fn transition(&mut self, to: PaymentStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(DomainError::transition("payment", self.status.as_str(), to.as_str()));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn start_processing(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(PaymentStatus::Processing, now)
    }

    pub fn complete(&mut self, external_id: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition(PaymentStatus::Completed, now)?;
        self.external_id = Some(external_id.into());
        self.completed_at = Some(now);
        Ok(())
    }

    /// A failed payment must say why.
    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "failure reason must not be empty".to_string(),
            ));
        }
        self.transition(PaymentStatus::Failed, now)?;
        self.failure_reason = Some(reason.to_string());
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(PaymentStatus::Cancelled, now)
    }

    pub fn refund(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(PaymentStatus::Refunded, now)
    }

    /// Mark the payment as spent on `invoice_id`. Only completed payments
    /// that have not settled anything yet can be linked.
    pub fn link_invoice(&mut self, invoice_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        if !self.is_completed() {
            return Err(DomainError::InvariantViolation(format!(
                "payment {} is {}, only completed payments can settle an invoice",
                self.id,
                self.status.as_str()
            )));
        }
        if let Some(existing) = self.invoice_id {
            return Err(DomainError::InvariantViolation(format!(
                "payment {} already settled invoice {existing}",
                self.id
            )));
        }
        self.invoice_id = Some(invoice_id);
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// INVOICE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn accepts_payment(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent | Self::Overdue)
    }
}

/// A billing invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub payment_id: Option<Uuid>,

    pub invoice_number: String,
    pub invoice_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub billing_period_start: Option<DateTime<Utc>>,
    pub billing_period_end: Option<DateTime<Utc>>,

    // Amounts
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub tax_rate: Decimal,
    pub currency: String,

    pub status: InvoiceStatus,

    // Last applied payment
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Draft invoice with `total = subtotal + tax` and nothing paid.
    pub fn new(
        company_id: Uuid,
        invoice_number: impl Into<String>,
        subtotal: Decimal,
        tax_amount: Decimal,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if subtotal.is_sign_negative() || tax_amount.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "invoice amounts must be non-negative (subtotal {subtotal}, tax {tax_amount})"
            )));
        }
        let total_amount = subtotal + tax_amount;
        Ok(Self {
            id: Uuid::new_v4(),
            company_id,
            subscription_id: None,
            payment_id: None,
            invoice_number: invoice_number.into(),
            invoice_date: now,
            due_date,
            billing_period_start: None,
            billing_period_end: None,
            subtotal,
            tax_amount,
            total_amount,
            paid_amount: Decimal::ZERO,
            balance_amount: total_amount,
            tax_rate: DEFAULT_TAX_RATE,
            currency: DEFAULT_CURRENCY.to_string(),
            status: InvoiceStatus::Draft,
            payment_method: None,
            payment_reference: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid || self.balance_amount <= Decimal::ZERO
    }

    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.is_paid() && self.status != InvoiceStatus::Cancelled && now > self.due_date
    }

    #[must_use]
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_overdue(now) {
            return 0;
        }
        (now - self.due_date).num_days()
    }

    /// Record a payment of `amount`. Rejects non-positive amounts and any
    /// amount larger than the outstanding balance; the invoice is unchanged
    /// on error.
    pub fn apply_payment(
        &mut self,
        amount: Decimal,
        method: Option<PaymentMethod>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.status.accepts_payment() {
            return Err(DomainError::transition(
                "invoice",
                self.status.as_str(),
                InvoiceStatus::Paid.as_str(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "payment amount must be positive, got {amount}"
            )));
        }
        if amount > self.balance_amount {
            return Err(DomainError::InvariantViolation(format!(
                "payment {amount} exceeds outstanding balance {}",
                self.balance_amount
            )));
        }

        self.paid_amount += amount;
        self.balance_amount = self.total_amount - self.paid_amount;
        if self.balance_amount <= Decimal::ZERO {
            self.status = InvoiceStatus::Paid;
        }
        if method.is_some() {
            self.payment_method = method;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Apply a completed payment's total and link it to this invoice. A
    /// payment already linked to an invoice, or one from another company,
    /// is rejected.
    pub fn apply_completed_payment(&mut self, payment: &Payment, now: DateTime<Utc>) -> Result<()> {
        if !payment.is_completed() {
            return Err(DomainError::InvariantViolation(format!(
                "payment {} is {}, only completed payments can be applied",
                payment.id,
                payment.status.as_str()
            )));
        }
        if payment.company_id != self.company_id {
            return Err(DomainError::InvariantViolation(format!(
                "payment {} belongs to company {}",
                payment.id, payment.company_id
            )));
        }
        if self.payment_id == Some(payment.id) || payment.invoice_id.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "payment {} has already been applied",
                payment.id
            )));
        }
        self.apply_payment(payment.total_amount, Some(payment.method), now)?;
        self.payment_id = Some(payment.id);
        self.payment_reference = payment.external_id.clone();
        Ok(())
    }

    /// `draft -> sent`. An invoice with nothing to pay goes straight to paid.
    pub fn mark_sent(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::transition("invoice", self.status.as_str(), "sent"));
        }
        self.status = if self.balance_amount <= Decimal::ZERO {
            InvoiceStatus::Paid
        } else {
            InvoiceStatus::Sent
        };
        self.updated_at = now;
        Ok(())
    }

    /// `sent -> overdue` once past the due date. Returns whether it moved.
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == InvoiceStatus::Sent && self.is_overdue(now) {
            self.status = InvoiceStatus::Overdue;
            self.updated_at = now;
            return true;
        }
        false
    }

    /// Only unpaid invoices with nothing applied can be cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        let cancellable = matches!(
            self.status,
            InvoiceStatus::Draft | InvoiceStatus::Sent | InvoiceStatus::Overdue
        ) && self.paid_amount.is_zero();
        if !cancellable {
            return Err(DomainError::transition("invoice", self.status.as_str(), "cancelled"));
        }
        self.status = InvoiceStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn formatted_amount(&self) -> String {
        format_currency(self.total_amount, &self.currency)
    }

    #[must_use]
    pub fn formatted_balance(&self) -> String {
        format_currency(self.balance_amount, &self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn invoice(now: DateTime<Utc>) -> Invoice {
        Invoice::new(
            Uuid::new_v4(),
            "INV-2024-0001",
            dec!(100000),
            dec!(11000),
            now + Duration::days(14),
            now,
        )
        .unwrap()
    }

    fn subscription(now: DateTime<Utc>, cycle: BillingCycle, price: Decimal) -> Subscription {
        Subscription::new(
            Uuid::new_v4(),
            SubscriptionPlan::Premium,
            cycle,
            PlanLimits {
                max_vehicles: 10,
                max_drivers: 20,
                max_users: 5,
            },
            price,
            now - Duration::days(1),
            now + Duration::days(30),
        )
    }

    #[test]
    fn test_invoice_partial_then_full_payment() {
        let now = Utc::now();
        let mut inv = invoice(now);
        assert_eq!(inv.total_amount, dec!(111000));
        assert_eq!(inv.formatted_amount(), "Rp 111000.00");

        inv.apply_payment(dec!(50000), None, now).unwrap();
        assert_eq!(inv.paid_amount, dec!(50000));
        assert_eq!(inv.balance_amount, dec!(61000));
        assert!(!inv.is_paid());
        assert_eq!(inv.status, InvoiceStatus::Draft);

        inv.apply_payment(dec!(61000), Some(PaymentMethod::Qris), now).unwrap();
        assert_eq!(inv.balance_amount, Decimal::ZERO);
        assert!(inv.is_paid());
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert_eq!(inv.formatted_balance(), "Rp 0.00");
    }

    #[test]
    fn test_invoice_rejects_bad_payments_unchanged() {
        let now = Utc::now();
        let mut inv = invoice(now);
        let before = inv.clone();

        assert!(inv.apply_payment(Decimal::ZERO, None, now).is_err());
        assert!(inv.apply_payment(dec!(-5), None, now).is_err());
        assert!(inv.apply_payment(dec!(111000.01), None, now).is_err());
        assert_eq!(inv, before);

        inv.apply_payment(dec!(111000), None, now).unwrap();
        assert!(inv.apply_payment(dec!(1), None, now).is_err());
    }

    #[test]
    fn test_invoice_overdue() {
        let now = Utc::now();
        let mut inv = invoice(now);
        inv.mark_sent(now).unwrap();

        let later = now + Duration::days(17);
        assert!(inv.is_overdue(later));
        assert_eq!(inv.days_overdue(later), 3);
        assert!(inv.mark_overdue(later));
        assert_eq!(inv.status, InvoiceStatus::Overdue);

        // Still payable once overdue
        inv.apply_payment(dec!(111000), None, later).unwrap();
        assert!(!inv.is_overdue(later));
        assert_eq!(inv.days_overdue(later), 0);
    }

    #[test]
    fn test_invoice_cancel_rules() {
        let now = Utc::now();
        let mut inv = invoice(now);
        inv.apply_payment(dec!(1000), None, now).unwrap();
        assert!(inv.cancel(now).is_err());

        let mut fresh = invoice(now);
        fresh.cancel(now).unwrap();
        assert!(fresh.apply_payment(dec!(1), None, now).is_err());
        assert!(!fresh.is_overdue(now + Duration::days(60)));
    }

    #[test]
    fn test_apply_completed_payment_links_payment() {
        let now = Utc::now();
        let mut inv = invoice(now);
        let mut payment = Payment::new(
            inv.company_id,
            dec!(100000),
            dec!(11000),
            PaymentMethod::BankTransfer,
            PaymentType::Invoice,
            now,
        )
        .unwrap();

        assert!(inv.apply_completed_payment(&payment, now).is_err());

        payment.complete("xnd_123", now).unwrap();
        inv.apply_completed_payment(&payment, now).unwrap();
        assert!(inv.is_paid());
        assert_eq!(inv.payment_id, Some(payment.id));
        assert_eq!(inv.payment_reference.as_deref(), Some("xnd_123"));
        assert_eq!(inv.payment_method, Some(PaymentMethod::BankTransfer));
    }

    fn completed_payment(company_id: Uuid, amount: Decimal, now: DateTime<Utc>) -> Payment {
        let mut payment = Payment::new(
            company_id,
            amount,
            Decimal::ZERO,
            PaymentMethod::Qris,
            PaymentType::Invoice,
            now,
        )
        .unwrap();
        payment.complete("qr-1", now).unwrap();
        payment
    }

    #[test]
    fn test_payment_cannot_settle_twice() {
        let now = Utc::now();
        let mut inv = invoice(now);
        let mut payment = completed_payment(inv.company_id, dec!(50000), now);

        inv.apply_completed_payment(&payment, now).unwrap();
        // Same payment again, before and after it records the link
        assert!(inv.apply_completed_payment(&payment, now).is_err());
        payment.link_invoice(inv.id, now).unwrap();
        assert!(inv.apply_completed_payment(&payment, now).is_err());
        assert_eq!(inv.paid_amount, dec!(50000));
        assert_eq!(inv.balance_amount, dec!(61000));

        // Nor on another invoice
        let mut other = invoice(now);
        other.company_id = inv.company_id;
        assert!(other.apply_completed_payment(&payment, now).is_err());
        assert_eq!(other.paid_amount, Decimal::ZERO);
        assert!(payment.link_invoice(other.id, now).is_err());
        assert_eq!(payment.invoice_id, Some(inv.id));
    }

    #[test]
    fn test_payment_from_other_company_rejected() {
        let now = Utc::now();
        let mut inv = invoice(now);
        let payment = completed_payment(Uuid::new_v4(), dec!(1000), now);
        assert!(inv.apply_completed_payment(&payment, now).is_err());
        assert_eq!(inv.paid_amount, Decimal::ZERO);
    }

    #[test]
    fn test_link_requires_completed_payment() {
        let now = Utc::now();
        let mut pending = Payment::new(
            Uuid::new_v4(),
            dec!(10),
            Decimal::ZERO,
            PaymentMethod::EWallet,
            PaymentType::Invoice,
            now,
        )
        .unwrap();
        assert!(pending.link_invoice(Uuid::new_v4(), now).is_err());
        assert_eq!(pending.invoice_id, None);
    }

    #[test]
    fn test_zero_total_invoice_paid_when_sent() {
        let now = Utc::now();
        let mut inv = Invoice::new(
            Uuid::new_v4(),
            "INV-2024-0000",
            Decimal::ZERO,
            Decimal::ZERO,
            now + Duration::days(14),
            now,
        )
        .unwrap();
        assert!(inv.is_paid());
        assert_eq!(inv.status, InvoiceStatus::Draft);

        inv.mark_sent(now).unwrap();
        assert_eq!(inv.status, InvoiceStatus::Paid);
        assert!(!inv.is_overdue(now + Duration::days(30)));
        assert!(inv.cancel(now).is_err());

        // A non-zero invoice still waits for payment
        let mut due = invoice(now);
        due.mark_sent(now).unwrap();
        assert_eq!(due.status, InvoiceStatus::Sent);
    }

    #[test]
    fn test_payment_lifecycle() {
        let now = Utc::now();
        let mut p = Payment::new(
            Uuid::new_v4(),
            dec!(500000),
            dec!(55000),
            PaymentMethod::Qris,
            PaymentType::Subscription,
            now,
        )
        .unwrap();
        assert_eq!(p.total_amount, dec!(555000));

        p.start_processing(now).unwrap();
        assert!(p.fail("", now).is_err());
        p.complete("ext-1", now).unwrap();
        assert!(p.completed_at.is_some());

        assert!(p.cancel(now).is_err());
        assert!(p.fail("late", now).is_err());
        p.refund(now).unwrap();
        assert!(p.refund(now).is_err());
    }

    #[test]
    fn test_payment_fail_records_reason() {
        let now = Utc::now();
        let mut p = Payment::new(
            Uuid::new_v4(),
            dec!(1),
            Decimal::ZERO,
            PaymentMethod::EWallet,
            PaymentType::TopUp,
            now,
        )
        .unwrap();
        p.fail("insufficient funds", now).unwrap();
        assert_eq!(p.failure_reason.as_deref(), Some("insufficient funds"));
        assert!(p.refund(now).is_err());
    }

    #[test]
    fn test_payment_expiry() {
        let now = Utc::now();
        let mut p = Payment::new(
            Uuid::new_v4(),
            dec!(1),
            Decimal::ZERO,
            PaymentMethod::Qris,
            PaymentType::TopUp,
            now,
        )
        .unwrap();
        assert!(!p.is_expired(now));
        p.expires_at = Some(now + Duration::minutes(15));
        assert!(p.is_expired(now + Duration::minutes(16)));
    }

    #[test]
    fn test_subscription_window_and_limits() {
        let now = Utc::now();
        let mut sub = subscription(now, BillingCycle::Monthly, dec!(1500000));

        assert!(sub.is_subscription_active(now));
        assert_eq!(sub.days_until_expiry(now), 30);
        assert!(!sub.is_subscription_active(sub.end_date));
        assert!(sub.is_expired(sub.end_date));
        assert_eq!(sub.days_until_expiry(sub.end_date), 0);

        assert!(sub.can_add_vehicle(9));
        assert!(!sub.can_add_vehicle(10));
        assert!(sub.can_add_driver(19));
        assert!(!sub.can_add_user(5));

        sub.suspend(now).unwrap();
        assert!(!sub.is_subscription_active(now));
        sub.reactivate(now).unwrap();
        sub.cancel(now).unwrap();
        assert!(sub.reactivate(now).is_err());
    }

    #[test]
    fn test_monthly_price_and_features() {
        let now = Utc::now();
        let mut yearly = subscription(now, BillingCycle::Yearly, dec!(12000000));
        assert_eq!(yearly.monthly_price(), dec!(1000000));
        assert_eq!(yearly.tax_rate, dec!(11.00));

        yearly.features.insert("geofencing".into(), true);
        yearly.features.insert("api_access".into(), false);
        assert!(yearly.has_feature("geofencing"));
        assert!(!yearly.has_feature("api_access"));
        assert!(!yearly.has_feature("reports"));
    }

    #[test]
    fn test_tax_and_currency_formatting() {
        assert_eq!(tax_for(dec!(100000), DEFAULT_TAX_RATE), dec!(11000));
        assert_eq!(format_currency(dec!(12.5), "USD"), "USD 12.50");
    }
}
