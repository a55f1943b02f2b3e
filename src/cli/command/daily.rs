use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::{
    cli::RunArgs,
    config::Config,
    period::{DailyEnumerator, PeriodEnumerator},
    pipeline::RunSummary,
};

pub async fn daily(start_date: NaiveDate, end_date: NaiveDate, options: RunArgs) -> Result<RunSummary> {
    let config = daily_config(start_date, end_date, options)?;

    super::run(config).await
}

fn daily_config(start_date: NaiveDate, end_date: NaiveDate, options: RunArgs) -> Result<Config> {
    if end_date < start_date {
        bail!("end date {} is before start date {}", end_date, start_date);
    }

    let periods = PeriodEnumerator::Daily(DailyEnumerator::new(start_date, end_date));

    Ok(options.into_config(periods))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asset::DEFAULT_DAILY_PATH,
        cli::{Cli, Commands},
    };
    use clap::Parser;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn options() -> RunArgs {
        let cli = Cli::try_parse_from([
            "chirps-clip",
            "daily",
            "--start-date",
            "2021-01-01",
            "--end-date",
            "2021-01-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Daily { options, .. } => options,
            Commands::Monthly { .. } => panic!("expected daily"),
        }
    }

    #[test]
    fn should_cover_every_day_including_leap_day() {
        let config = daily_config(date(2020, 2, 27), date(2020, 3, 1), options()).unwrap();

        assert_eq!(config.periods.len(), 4);
        assert_eq!(config.catalog.daily_path, DEFAULT_DAILY_PATH);
    }

    #[test]
    fn should_reject_inverted_date_range() {
        assert!(daily_config(date(2021, 5, 7), date(2021, 5, 5), options()).is_err());
    }
}
