use anyhow::{bail, Result};

use crate::{
    cli::RunArgs,
    config::Config,
    period::{MonthlyEnumerator, PeriodEnumerator},
    pipeline::RunSummary,
};

pub async fn monthly(start_year: i32, end_year: i32, options: RunArgs) -> Result<RunSummary> {
    let config = monthly_config(start_year, end_year, options)?;

    super::run(config).await
}

fn monthly_config(start_year: i32, end_year: i32, options: RunArgs) -> Result<Config> {
    if end_year < start_year {
        bail!(
            "end year {} is before start year {}",
            end_year,
            start_year
        );
    }

    let periods = PeriodEnumerator::Monthly(MonthlyEnumerator::new(start_year, end_year));

    Ok(options.into_config(periods))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn options() -> RunArgs {
        let cli = Cli::try_parse_from([
            "chirps-clip",
            "monthly",
            "--start-year",
            "1",
            "--end-year",
            "1",
        ])
        .unwrap();
        match cli.command {
            Commands::Monthly { options, .. } => options,
            Commands::Daily { .. } => panic!("expected monthly"),
        }
    }

    #[test]
    fn should_cover_every_month_of_the_range() {
        let config = monthly_config(2001, 2003, options()).unwrap();

        assert_eq!(config.periods.len(), 36);
    }

    #[test]
    fn should_reject_inverted_year_range() {
        assert!(monthly_config(2003, 2001, options()).is_err());
    }
}
