//! Simulation request and its validation.

use boa_core::{AssetType, BothRevenuePolicy, Error, Result, Volume};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A hypothetical asset to benchmark over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub asset_type: AssetType,
    /// Asset capacity (MW); each period offers half of it in MWh.
    pub capacity_mw: f64,
    pub price_bid: Option<f64>,
    pub price_offer: Option<f64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl SimulationRequest {
    /// Reject requests that cannot be simulated.
    pub fn validate(&self, policy: BothRevenuePolicy) -> Result<()> {
        if !self.capacity_mw.is_finite() || self.capacity_mw <= 0.0 {
            return Err(Error::validation(format!(
                "capacity_mw must be a positive number, got {}",
                self.capacity_mw
            )));
        }
        if self.start_date > self.end_date {
            return Err(Error::validation(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        for (name, price) in [("price_bid", self.price_bid), ("price_offer", self.price_offer)] {
            if let Some(p) = price {
                if !p.is_finite() {
                    return Err(Error::validation(format!("{name} must be finite, got {p}")));
                }
            }
        }

        match self.asset_type {
            AssetType::Offer if self.price_offer.is_none() => {
                Err(Error::validation("price_offer is required for an offer asset"))
            }
            AssetType::Bid if self.price_bid.is_none() => {
                Err(Error::validation("price_bid is required for a bid asset"))
            }
            AssetType::Both => match policy {
                BothRevenuePolicy::Strict
                    if self.price_bid.is_none() || self.price_offer.is_none() =>
                {
                    Err(Error::validation(
                        "price_bid and price_offer are both required for a both asset",
                    ))
                }
                BothRevenuePolicy::AvailablePrice
                    if self.price_bid.is_none() && self.price_offer.is_none() =>
                {
                    Err(Error::validation(
                        "a both asset needs at least one of price_bid or price_offer",
                    ))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// Volume offered per settlement period (MWh).
    pub fn volume_per_period(&self) -> Volume {
        self.capacity_mw / 2.0
    }

    /// Price for the offer leg, when that leg runs.
    pub fn offer_leg_price(&self) -> Option<f64> {
        self.price_offer.filter(|_| self.asset_type.offers())
    }

    /// Price for the bid leg, when that leg runs.
    pub fn bid_leg_price(&self) -> Option<f64> {
        self.price_bid.filter(|_| self.asset_type.bids())
    }

    /// Price applied to accepted volume for revenue.
    ///
    /// A `both` asset uses the mean of its prices, or the single price it
    /// carries. Zero when no price applies.
    pub fn reference_price(&self) -> f64 {
        match (self.offer_leg_price(), self.bid_leg_price()) {
            (Some(offer), Some(bid)) => (offer + bid) / 2.0,
            (Some(price), None) | (None, Some(price)) => price,
            (None, None) => 0.0,
        }
    }
}
