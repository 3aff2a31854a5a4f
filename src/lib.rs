//! Recurring Cart: Multi-Pass Totals for Subscription Commerce
//!
//! A Rust library that computes recurring-billing totals for a shopping
//! cart mixing one-off products and subscriptions with different billing
//! schedules (period, interval, trial, sign-up fee, synchronized billing
//! day).
//!
//! # What does it do?
//!
//! Given one cart of line items, the engine:
//!
//! - partitions subscription items into **cohorts** sharing an identical
//!   future billing schedule,
//! - computes an independent, correct monetary total (items, discounts,
//!   tax, shipping, fees) for the *initial* checkout charge and for *each*
//!   future recurring cohort, and
//! - does so without infinite recursion, even though computing a cohort's
//!   total re-enters the same general-purpose cart calculator that
//!   triggered the whole process.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │            RecurringTotalsEngine (one cycle)           │
//! │                                                        │
//! │  guard ─► initial pass ─► grouping ─► cohort passes    │
//! │    ▲                                       │           │
//! │    │          CalculationContext           │           │
//! │    └────── (mode + cohort stack) ◄─────────┘           │
//! └───────────────┬────────────────────────────────────────┘
//!                 │ CartView + mode
//!   ┌─────────────▼──────────────┐
//!   │     TotalsCalculator       │  pipeline of passes
//!   │  price │ discount │ tax │  │  (every resolver is a
//!   │        shipping            │   function of item+mode)
//!   └────────────────────────────┘
//! ```
//!
//! Every collaborator the engine consults is a trait with a shipped
//! default, so the crate computes end-to-end out of the box and slots into
//! a host platform by swapping implementations.
//!
//! # Quick Start
//!
//! ```
//! use recurring_cart::{
//!     calculator::StandardTotalsCalculator,
//!     cart::{Cart, LineItem, SubscriptionTerms},
//!     context::CalculationContext,
//!     engine::RecurringTotalsEngine,
//!     money::Currency,
//!     resolver::{
//!         CalendarSchedulePlanner, DefaultFeePolicy, FlatTax, NoDiscounts, PerItemShipping,
//!         StandardPriceResolver,
//!     },
//!     schedule::{BillingPeriod, BillingSchedule},
//! };
//! use rust_decimal::Decimal;
//!
//! # fn main() -> recurring_cart::error::Result<()> {
//! // A cart with a $20 one-off item and a $10/month subscription.
//! let mut cart = Cart::new(Currency::usd());
//! cart.add_item(LineItem::one_off("mug", Decimal::new(2000, 2), 1)?);
//! cart.add_item(LineItem::subscription(
//!     "coffee-club",
//!     Decimal::new(1000, 2),
//!     1,
//!     SubscriptionTerms::new(BillingSchedule::every(1, BillingPeriod::Month)),
//! )?);
//!
//! let shipping = PerItemShipping::new(Decimal::ZERO);
//! let engine = RecurringTotalsEngine::new(
//!     StandardTotalsCalculator::new(
//!         StandardPriceResolver,
//!         NoDiscounts,
//!         FlatTax::none(),
//!         shipping,
//!     ),
//!     CalendarSchedulePlanner,
//!     DefaultFeePolicy,
//!     shipping,
//! );
//!
//! let ctx = CalculationContext::new();
//! let initial_total = engine.run(&mut cart, &ctx)?;
//!
//! assert_eq!(initial_total, Decimal::new(3000, 2)); // $30 due today
//! assert_eq!(cart.recurring_carts().len(), 1);
//! assert_eq!(cart.recurring_carts()[0].total(), Decimal::new(1000, 2)); // $10/month
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`engine`]: the calculation cycle (guard, grouping, cohort passes,
//!   reconciliation)
//! - [`context`]: calculation mode and the re-entrancy stack
//! - [`grouping`]: cohort key derivation and cart partitioning
//! - [`cohort`]: per-cohort cart views and the cohort cart factory
//! - [`shipping`]: shipping package synthesis per pass, plus the
//!   per-cohort package cache
//! - [`calculator`]: the totals calculator seam and its shipped pipeline
//! - [`resolver`]: collaborator seams (price, discount, tax, shipping,
//!   schedule, fee policy) with shipped defaults
//! - [`cart`] / [`schedule`] / [`money`]: the data model
//! - [`audit`]: structured audit events per calculation cycle
//! - [`error`]: error types with cohort-recoverability classification
//!
//! # Re-entrancy
//!
//! The engine's guard makes multi-pass invocation safe: if `run` is called
//! while a pass is already in progress (detectable from the shared
//! [`context::CalculationContext`]), it returns the cart's current total
//! immediately and computes nothing. Price, discount, and shipping
//! resolvers can therefore trigger total recalculation freely without
//! recursing.
//!
//! # Determinism
//!
//! Cohorts are produced and processed in the order their schedule was
//! first encountered in the cart, and one cycle derives a single start
//! instant threaded through grouping and date derivation, so a cycle is
//! internally consistent even across a billing-day boundary.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod audit;
pub mod calculator;
pub mod cart;
pub mod cohort;
pub mod context;
pub mod engine;
pub mod error;
pub mod grouping;
pub mod money;
pub mod resolver;
pub mod schedule;
pub mod shipping;

pub use cart::{Cart, CartFee, CartTotals, ItemId, LineItem, SubscriptionTerms};
pub use context::{CalculationContext, CalculationMode};
pub use engine::RecurringTotalsEngine;
pub use error::{CartCalcError, Result};
pub use grouping::GroupingKey;
