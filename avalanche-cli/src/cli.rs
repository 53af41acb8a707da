use anyhow::{Context, Result, anyhow, bail};
use avalanche_core::{
    AggregateState, Aggregator, AvalancheCenterId, Config, HttpFetcher, QueryClient, QueryResult,
    QueryState, RequestedTime, TracingReporter,
    config::Hosts,
    endpoint::{
        nac::WeatherForecastQuery,
        nwac::NwacWeatherForecastQuery,
        observations::{ObservationList, ObservationsQuery},
        snowbound::{StationListQuery, StationTimeSeriesQuery},
    },
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use inquire::{CustomType, Select, Text};
use serde::Serialize;
use std::sync::Arc;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "avalanche", version, about = "Avalanche forecast and weather data CLI")]
pub struct Cli {
    /// Log fetch and cache activity at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactively edit the configuration file.
    Configure,

    /// Show the NWAC mountain weather forecast for a zone.
    Forecast {
        /// Avalanche center id, e.g. "NWAC". Defaults to the configured center.
        #[arg(long)]
        center: Option<String>,

        /// Forecast zone id.
        #[arg(long)]
        zone: i64,

        /// Forecast date (YYYY-MM-DD); if absent, means "latest".
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show a weather product by id.
    Weather {
        /// Product id from the avalanche center's forecast.
        forecast_id: i64,
    },

    /// List weather stations for a data source.
    Stations {
        /// Data source, e.g. "nwac".
        #[arg(long)]
        source: String,

        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Show time-series data for one or more stations.
    Timeseries {
        /// Comma-separated station ids.
        #[arg(long, value_delimiter = ',', required = true)]
        stations: Vec<i64>,

        #[arg(long, default_value = "nwac")]
        source: String,

        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,
    },

    /// List public observations from the month before a date.
    Observations {
        #[arg(long)]
        center: Option<String>,

        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Forecast, weather product and observations for one zone, fetched together.
    Dashboard {
        #[arg(long)]
        center: Option<String>,

        #[arg(long)]
        zone: i64,

        #[arg(long)]
        forecast_id: Option<i64>,

        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        if let Command::Configure = self.command {
            return configure();
        }

        let config = Config::load()?;
        let client = build_client(&config)?;
        let aggregator = Aggregator::new(client.reporter());

        let result = run_command(self.command, &config, &client, &aggregator).await;
        client.shutdown();
        result
    }
}

async fn run_command(command: Command, config: &Config, client: &QueryClient, aggregator: &Aggregator) -> Result<()> {
    match command {
        Command::Configure => configure(),

        Command::Forecast { center, zone, date } => {
            let center = resolve_center(config, center.as_deref())?;
            let query = client.query(NwacWeatherForecastQuery::new(
                &config.hosts.nwac,
                center,
                zone,
                requested(date),
            ));

            let result = query.fetch().await;
            if result.ignored {
                println!("Mountain weather forecasts are only published by NWAC (requested {center}).");
                return Ok(());
            }
            check(aggregator, &[&result])?;

            if let Some(forecast) = &result.data {
                let mwf = &forecast.mountain_weather_forecast;
                println!(
                    "Forecast by {} {}, published {}",
                    forecast.forecaster.first_name, forecast.forecaster.last_name, mwf.publish_date
                );
                for period in &forecast.weather_forecasts {
                    println!("{} {}: {}", period.date, period.time_of_day.label(), period.description);
                }
            }
            Ok(())
        }

        Command::Weather { forecast_id } => {
            let query = client.query(WeatherForecastQuery::new(
                &config.hosts.national_avalanche_center,
                Some(forecast_id),
            ));
            let result = query.fetch().await;
            check(aggregator, &[&result])?;
            print_json(&result)
        }

        Command::Stations { source, page } => {
            let query = client.query(StationListQuery { host: config.hosts.snowbound.clone(), source, page });
            let result = query.fetch().await;
            check(aggregator, &[&result])?;

            if let Some(response) = &result.data {
                println!("Page {} of {} ({} stations)", response.current_page, response.pages, response.total);
                for station in &response.results {
                    let state = if station.status.is_active() { "active" } else { "inactive" };
                    println!("{:>6}  {:<40} {:>6.0} ft  {state}", station.stid, station.name, station.elevation);
                }
            }
            Ok(())
        }

        Command::Timeseries { stations, source, start, end } => {
            if end < start {
                bail!("--end ({end}) must not be before --start ({start})");
            }
            let query = client.query(StationTimeSeriesQuery {
                host: config.hosts.snowbound.clone(),
                source,
                stations,
                start,
                end,
            });
            let result = query.fetch().await;
            check(aggregator, &[&result])?;
            print_json(&result)
        }

        Command::Observations { center, date } => {
            let center = resolve_center(config, center.as_deref())?;
            let query = client.query(ObservationsQuery::month_before(
                &config.hosts.national_avalanche_center,
                center,
                requested(date),
            ));
            let result = query.fetch().await;
            check(aggregator, &[&result])?;

            let endpoint = query.endpoint();
            print_observations(&result, center, endpoint.start, endpoint.end);
            Ok(())
        }

        Command::Dashboard { center, zone, forecast_id, date } => {
            let center = resolve_center(config, center.as_deref())?;
            let at = requested(date);

            let forecast = client.query(NwacWeatherForecastQuery::new(&config.hosts.nwac, center, zone, at));
            let weather = client.query(WeatherForecastQuery::new(
                &config.hosts.national_avalanche_center,
                forecast_id,
            ));
            let observations = client.query(ObservationsQuery::month_before(
                &config.hosts.national_avalanche_center,
                center,
                at,
            ));

            let (forecast_result, weather_result, observations_result) =
                tokio::join!(forecast.fetch(), weather.fetch(), observations.fetch());

            check(aggregator, &[&forecast_result, &weather_result, &observations_result])?;

            if forecast_result.data.is_some() {
                println!("== Mountain weather forecast ==");
                print_json(&forecast_result)?;
            }
            if weather_result.data.is_some() {
                println!("== Weather product ==");
                print_json(&weather_result)?;
            }
            println!("== Observations ==");
            let endpoint = observations.endpoint();
            print_observations(&observations_result, center, endpoint.start, endpoint.end);
            Ok(())
        }
    }
}

fn build_client(config: &Config) -> Result<QueryClient> {
    let fetcher = HttpFetcher::new(config.http_timeout())?;
    Ok(QueryClient::new(Arc::new(fetcher), Arc::new(TracingReporter)).with_defaults(config.query_options()))
}

fn resolve_center(config: &Config, center: Option<&str>) -> Result<AvalancheCenterId> {
    let explicit = center.map(AvalancheCenterId::try_from).transpose()?;
    config.center_or_default(explicit)
}

fn requested(date: Option<NaiveDate>) -> RequestedTime {
    date.map(RequestedTime::on).unwrap_or(RequestedTime::Latest)
}

/// Print the aggregate outcome when it replaces the data. Failures become an
/// error exit; the details were already logged by the reporter.
fn check(aggregator: &Aggregator, results: &[&dyn QueryState]) -> Result<()> {
    let state = aggregator.evaluate(results);
    match (&state, state.outcome()) {
        (AggregateState::Error(_), Some(outcome)) => Err(anyhow!("{}\n{}", outcome.title, outcome.reason)),
        (_, Some(outcome)) => {
            println!("{}\n{}", outcome.title, outcome.reason);
            Ok(())
        }
        (_, None) => Ok(()),
    }
}

fn print_json<T: Serialize>(result: &QueryResult<T>) -> Result<()> {
    if let Some(data) = &result.data {
        let text = serde_json::to_string_pretty(&**data).context("Failed to render result as JSON")?;
        println!("{text}");
    }
    Ok(())
}

fn print_observations(result: &QueryResult<ObservationList>, center: AvalancheCenterId, start: NaiveDate, end: NaiveDate) {
    let Some(list) = &result.data else {
        return;
    };

    if list.is_empty() {
        println!("No observations were recorded for {center} between {start} and {end}.");
        return;
    }

    for obs in list.newest_first() {
        println!("{}  {}  {} ({})", obs.start_date, obs.location_name, obs.name, obs.observer_type);
        if let Some(summary) = &obs.observation_summary {
            println!("    {summary}");
        }
    }
}

/// Interactive configuration flow, saved back to the config file.
fn configure() -> Result<()> {
    let mut cfg = Config::load()?;

    let centers: Vec<AvalancheCenterId> = AvalancheCenterId::all().to_vec();
    let cursor = cfg
        .default_center_id()
        .ok()
        .and_then(|current| centers.iter().position(|id| *id == current))
        .unwrap_or(0);
    let center = Select::new("Default avalanche center:", centers)
        .with_starting_cursor(cursor)
        .prompt()
        .context("Failed to read default avalanche center")?;
    cfg.set_default_center(center);

    let nwac = Text::new("NWAC host:")
        .with_default(&cfg.hosts.nwac)
        .prompt()
        .context("Failed to read NWAC host")?;
    let national = Text::new("National Avalanche Center API host:")
        .with_default(&cfg.hosts.national_avalanche_center)
        .prompt()
        .context("Failed to read National Avalanche Center host")?;
    let snowbound = Text::new("Snowbound host:")
        .with_default(&cfg.hosts.snowbound)
        .prompt()
        .context("Failed to read Snowbound host")?;
    cfg.hosts = Hosts { nwac, national_avalanche_center: national, snowbound };

    cfg.cache.stale_time_secs = CustomType::<u64>::new("Refresh cached data after (seconds):")
        .with_default(cfg.cache.stale_time_secs)
        .prompt()
        .context("Failed to read stale time")?;
    cfg.cache.cache_time_secs = CustomType::<u64>::new("Keep unused cached data for (seconds):")
        .with_default(cfg.cache.cache_time_secs)
        .prompt()
        .context("Failed to read cache time")?;
    cfg.http.timeout_secs = CustomType::<u64>::new("HTTP timeout (seconds):")
        .with_default(cfg.http.timeout_secs)
        .prompt()
        .context("Failed to read HTTP timeout")?;

    cfg.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}
