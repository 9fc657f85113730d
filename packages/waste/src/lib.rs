#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Waste generation and collection revenue.
//!
//! Both projections inherit the relative uncertainty of the population
//! ensemble they are derived from. Multiplying by deterministic rates
//! cannot make an estimate more certain, so the band is never narrowed.

use serde::{Deserialize, Serialize};
use waste_map_estimate_models::EnsembleEstimate;
use waste_map_settlement_models::SettlementType;
use waste_map_waste_models::{RevenueProjection, Season, UncertaintyBand, WasteProjection};
use waste_map_zone_models::{SocioeconomicLevel, Zone, ZoneType};

/// Days per average month (365.25 / 12).
pub const DAYS_PER_MONTH: f64 = 30.4375;

/// Waste generation rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct WasteConfig {
    /// kg per person per day.
    pub informal_kg_per_capita: f64,
    pub mixed_kg_per_capita: f64,
    pub formal_kg_per_capita: f64,
    pub low_income_multiplier: f64,
    pub middle_income_multiplier: f64,
    pub high_income_multiplier: f64,
    /// kg per non-residential building per day, by zone type.
    pub residential_zone_kg_per_building: f64,
    pub mixed_use_zone_kg_per_building: f64,
    pub commercial_zone_kg_per_building: f64,
    pub institutional_zone_kg_per_building: f64,
    pub industrial_zone_kg_per_building: f64,
    pub green_space_zone_kg_per_building: f64,
    pub wet_season_multiplier: f64,
    pub dry_season_multiplier: f64,
    /// Relative band used when the population interval has no width to
    /// carry over (zero population with non-residential waste).
    pub unmeasured_relative_half_width: f64,
}

impl Default for WasteConfig {
    fn default() -> Self {
        Self {
            informal_kg_per_capita: 0.40,
            mixed_kg_per_capita: 0.50,
            formal_kg_per_capita: 0.60,
            low_income_multiplier: 0.85,
            middle_income_multiplier: 1.0,
            high_income_multiplier: 1.25,
            residential_zone_kg_per_building: 2.0,
            mixed_use_zone_kg_per_building: 3.0,
            commercial_zone_kg_per_building: 5.0,
            institutional_zone_kg_per_building: 4.0,
            industrial_zone_kg_per_building: 8.0,
            green_space_zone_kg_per_building: 1.0,
            wet_season_multiplier: 1.15,
            dry_season_multiplier: 0.95,
            unmeasured_relative_half_width: 0.30,
        }
    }
}

impl WasteConfig {
    #[must_use]
    pub const fn per_capita(&self, settlement_type: SettlementType) -> f64 {
        match settlement_type {
            SettlementType::Informal => self.informal_kg_per_capita,
            SettlementType::Mixed => self.mixed_kg_per_capita,
            SettlementType::Formal => self.formal_kg_per_capita,
        }
    }

    /// Multiplier for a socioeconomic level; 1.0 when the level is unknown.
    #[must_use]
    pub const fn socioeconomic_multiplier(&self, level: Option<SocioeconomicLevel>) -> f64 {
        match level {
            Some(SocioeconomicLevel::Low) => self.low_income_multiplier,
            Some(SocioeconomicLevel::Middle) => self.middle_income_multiplier,
            Some(SocioeconomicLevel::High) => self.high_income_multiplier,
            None => 1.0,
        }
    }

    #[must_use]
    pub const fn non_residential_rate(&self, zone_type: ZoneType) -> f64 {
        match zone_type {
            ZoneType::Residential => self.residential_zone_kg_per_building,
            ZoneType::MixedUse => self.mixed_use_zone_kg_per_building,
            ZoneType::Commercial => self.commercial_zone_kg_per_building,
            ZoneType::Institutional => self.institutional_zone_kg_per_building,
            ZoneType::Industrial => self.industrial_zone_kg_per_building,
            ZoneType::GreenSpace => self.green_space_zone_kg_per_building,
        }
    }

    /// Multiplier for an optional season; 1.0 when none is requested.
    #[must_use]
    pub const fn seasonal_multiplier(&self, season: Option<Season>) -> f64 {
        match season {
            Some(Season::Wet) => self.wet_season_multiplier,
            Some(Season::Dry) => self.dry_season_multiplier,
            None => 1.0,
        }
    }
}

/// Monthly collection charges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RevenueConfig {
    /// Monthly charge per residential building, by settlement type.
    pub informal_monthly_charge: f64,
    pub mixed_monthly_charge: f64,
    pub formal_monthly_charge: f64,
    /// Monthly charge per non-residential building.
    pub commercial_monthly_charge: f64,
    /// Expected share of billed charges actually collected, 0-1.
    pub collection_rate: f64,
    pub currency: String,
}

impl Default for RevenueConfig {
    fn default() -> Self {
        Self {
            informal_monthly_charge: 2.0,
            mixed_monthly_charge: 4.0,
            formal_monthly_charge: 8.0,
            commercial_monthly_charge: 15.0,
            collection_rate: 0.7,
            currency: "USD".to_string(),
        }
    }
}

impl RevenueConfig {
    #[must_use]
    pub const fn residential_charge(&self, settlement_type: SettlementType) -> f64 {
        match settlement_type {
            SettlementType::Informal => self.informal_monthly_charge,
            SettlementType::Mixed => self.mixed_monthly_charge,
            SettlementType::Formal => self.formal_monthly_charge,
        }
    }
}

/// Projects daily, weekly and monthly waste for a zone.
///
/// `non_residential_buildings` is the count of surviving buildings whose
/// use is not residential. The seasonal multiplier is applied to both the
/// residential and the non-residential part, and only when `season` is
/// given.
#[must_use]
pub fn project_waste(
    population: &EnsembleEstimate,
    settlement_type: SettlementType,
    zone: &Zone,
    non_residential_buildings: usize,
    season: Option<Season>,
    config: &WasteConfig,
) -> WasteProjection {
    let seasonal = config.seasonal_multiplier(season);
    let per_capita = config.per_capita(settlement_type)
        * config.socioeconomic_multiplier(zone.socioeconomic_level)
        * seasonal;

    #[allow(clippy::cast_precision_loss)]
    let non_residential_kg_per_day =
        non_residential_buildings as f64 * config.non_residential_rate(zone.zone_type) * seasonal;

    let daily_kg = population
        .consensus_value
        .mul_add(per_capita, non_residential_kg_per_day);
    let relative_half_width = if population.consensus_value > 0.0 {
        population.relative_half_width()
    } else {
        log::debug!(
            "Zone {} has no population interval; waste band set to ±{:.0}%",
            zone.id,
            config.unmeasured_relative_half_width * 100.0
        );
        config.unmeasured_relative_half_width
    };
    let uncertainty = UncertaintyBand::around(daily_kg, relative_half_width);

    log::info!(
        "Waste projection for zone {}: {daily_kg:.0} kg/day ±{:.0}% \
         ({per_capita:.3} kg/person/day, {non_residential_kg_per_day:.0} kg non-residential)",
        zone.id,
        uncertainty.relative_percent,
    );

    WasteProjection {
        daily_kg,
        weekly_tonnes: daily_kg * 7.0 / 1000.0,
        monthly_tonnes: daily_kg * DAYS_PER_MONTH / 1000.0,
        uncertainty,
        per_capita_kg_per_day: per_capita,
        non_residential_kg_per_day,
        seasonal_adjustment: season,
    }
}

/// Projects monthly collection revenue.
///
/// `relative_half_width` is the population ensemble's relative half-width;
/// the revenue band is the same.
#[must_use]
pub fn project_revenue(
    residential_buildings: usize,
    non_residential_buildings: usize,
    settlement_type: SettlementType,
    relative_half_width: f64,
    config: &RevenueConfig,
) -> RevenueProjection {
    #[allow(clippy::cast_precision_loss)]
    let monthly_gross = (residential_buildings as f64)
        .mul_add(
            config.residential_charge(settlement_type),
            non_residential_buildings as f64 * config.commercial_monthly_charge,
        );
    let expected_monthly_collected = monthly_gross * config.collection_rate.clamp(0.0, 1.0);

    RevenueProjection {
        billable_buildings: (residential_buildings + non_residential_buildings) as u64,
        monthly_gross,
        expected_monthly_collected,
        currency: config.currency.clone(),
        uncertainty: UncertaintyBand::around(expected_monthly_collected, relative_half_width),
    }
}
