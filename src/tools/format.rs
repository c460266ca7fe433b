//! Human-readable rendering of WHOOP API responses.
//!
//! Collection endpoints return `{"records": [...]}`; only the first record
//! is rendered. Every score field may be missing or null, in which case it
//! reads as zero (or "Unknown" for text).

use anyhow::Context as _;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

const UNKNOWN: &str = "Unknown";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;
const MILLIS_PER_MINUTE: f64 = 60_000.0;
const KILOJOULES_PER_KCAL: f64 = 4.184;
const METERS_PER_MILE: f64 = 1609.34;
const INCHES_PER_METER: f64 = 39.37;
const POUNDS_PER_KILOGRAM: f64 = 2.204_62;

/// Weekday, month, day and year, e.g. "Tuesday, Mar 05, 2024".
const DAY_FORMAT: &str = "%A, %b %d, %Y";
const MEMBER_SINCE_FORMAT: &str = "%B %d, %Y";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

impl<T: for<'de> Deserialize<'de>> Page<T> {
    fn first(body: &Value, what: &str) -> anyhow::Result<Option<T>> {
        let page = Self::deserialize(body).with_context(|| format!("unexpected {what} response"))?;
        Ok(page.records.into_iter().next())
    }
}

#[derive(Debug, Deserialize)]
struct Sleep {
    start: Option<String>,
    end: Option<String>,
    nap: Option<bool>,
    score: Option<SleepScore>,
}

#[derive(Debug, Default, Deserialize)]
struct SleepScore {
    stage_summary: Option<StageSummary>,
    sleep_performance_percentage: Option<f64>,
    sleep_efficiency_percentage: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct StageSummary {
    total_in_bed_time_milli: Option<f64>,
    total_awake_time_milli: Option<f64>,
    total_light_sleep_time_milli: Option<f64>,
    total_slow_wave_sleep_time_milli: Option<f64>,
    total_rem_sleep_time_milli: Option<f64>,
    sleep_cycle_count: Option<u32>,
    disturbance_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct Recovery {
    created_at: Option<String>,
    score: Option<RecoveryScore>,
}

#[derive(Debug, Default, Deserialize)]
struct RecoveryScore {
    recovery_score: Option<f64>,
    resting_heart_rate: Option<f64>,
    hrv_rmssd_milli: Option<f64>,
    spo2_percentage: Option<f64>,
    skin_temp_celsius: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Cycle {
    start: Option<String>,
    score_state: Option<String>,
    score: Option<StrainScore>,
}

#[derive(Debug, Default, Deserialize)]
struct StrainScore {
    strain: Option<f64>,
    kilojoule: Option<f64>,
    average_heart_rate: Option<f64>,
    max_heart_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Workout {
    sport_id: Option<i32>,
    start: Option<String>,
    end: Option<String>,
    score: Option<WorkoutScore>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkoutScore {
    strain: Option<f64>,
    kilojoule: Option<f64>,
    average_heart_rate: Option<f64>,
    max_heart_rate: Option<f64>,
    distance_meter: Option<f64>,
    zone_duration: Option<Zones>,
}

#[derive(Debug, Default, Deserialize)]
struct Zones {
    zone_one_milli: Option<f64>,
    zone_two_milli: Option<f64>,
    zone_three_milli: Option<f64>,
    zone_four_milli: Option<f64>,
    zone_five_milli: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(alias = "firstName")]
    first_name: Option<String>,
    #[serde(alias = "lastName")]
    last_name: Option<String>,
    email: Option<String>,
    #[serde(alias = "createdAt")]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BodyMeasurement {
    height_meter: Option<f64>,
    weight_kilogram: Option<f64>,
    max_heart_rate: Option<f64>,
}

fn or_zero(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

fn human_date(raw: Option<&str>, format: &str) -> String {
    raw.map_or_else(
        || format!("{UNKNOWN} Date"),
        |raw| {
            DateTime::parse_from_rfc3339(raw)
                .map_or_else(|_| raw.to_string(), |dt| dt.format(format).to_string())
        },
    )
}

/// Whole hours and leftover whole minutes, e.g. `7h 24m`.
fn hours_minutes(hours: f64) -> String {
    format!("{}h {}m", hours.trunc(), (hours.fract() * 60.0).trunc())
}

fn minutes(millis: Option<f64>) -> f64 {
    or_zero(millis) / MILLIS_PER_MINUTE
}

fn strain_level(strain: f64) -> &'static str {
    if strain >= 18.0 {
        "All Out (18.0-21.0)"
    } else if strain >= 14.0 {
        "Strenuous (14.0-17.9)"
    } else if strain >= 10.0 {
        "Moderate (10.0-13.9)"
    } else if strain >= 4.0 {
        "Light (4.0-9.9)"
    } else {
        "Minimal (0-3.9)"
    }
}

fn recovery_band(score: f64) -> &'static str {
    if score >= 67.0 {
        "Green (High)"
    } else if score >= 34.0 {
        "Yellow (Medium)"
    } else {
        "Red (Low)"
    }
}

/// Renders the first sleep record of a collection response.
///
/// # Errors
///
/// Returns an error if the body is not a sleep collection.
pub fn sleep(body: &Value) -> anyhow::Result<String> {
    let Some(sleep) = Page::<Sleep>::first(body, "sleep")? else {
        return Ok("No sleep data found for the specified date range.".to_string());
    };
    let score = sleep.score.unwrap_or_default();
    let stages = score.stage_summary.unwrap_or_default();

    let light = or_zero(stages.total_light_sleep_time_milli);
    let deep = or_zero(stages.total_slow_wave_sleep_time_milli);
    let rem = or_zero(stages.total_rem_sleep_time_milli);
    let asleep_hours = (light + deep + rem) / MILLIS_PER_HOUR;
    let in_bed_hours = or_zero(stages.total_in_bed_time_milli) / MILLIS_PER_HOUR;
    let kind = if sleep.nap.unwrap_or(false) { "Nap" } else { "Night Sleep" };

    Ok(format!(
        "Sleep: {kind} on {date}\n\
         Sleep Performance: {performance}%\n\
         Sleep Efficiency: {efficiency:.1}%\n\
         Sleep Duration: {asleep_hours:.2} hours ({asleep})\n\
         Time in Bed: {in_bed_hours:.2} hours ({in_bed})\n\
         Started: {start}\n\
         Ended: {end}\n\
         Light Sleep: {light:.1} minutes\n\
         Deep Sleep: {deep:.1} minutes\n\
         REM Sleep: {rem:.1} minutes\n\
         Awake: {awake:.1} minutes\n\
         Sleep Cycles: {cycles}\n\
         Disturbances: {disturbances}\n",
        date = human_date(sleep.start.as_deref(), DAY_FORMAT),
        performance = or_zero(score.sleep_performance_percentage),
        efficiency = or_zero(score.sleep_efficiency_percentage),
        asleep = hours_minutes(asleep_hours),
        in_bed = hours_minutes(in_bed_hours),
        start = sleep.start.as_deref().unwrap_or(UNKNOWN),
        end = sleep.end.as_deref().unwrap_or(UNKNOWN),
        light = light / MILLIS_PER_MINUTE,
        deep = deep / MILLIS_PER_MINUTE,
        rem = rem / MILLIS_PER_MINUTE,
        awake = minutes(stages.total_awake_time_milli),
        cycles = stages.sleep_cycle_count.unwrap_or(0),
        disturbances = stages.disturbance_count.unwrap_or(0),
    ))
}

/// Renders the first recovery record of a collection response.
///
/// # Errors
///
/// Returns an error if the body is not a recovery collection.
pub fn recovery(body: &Value) -> anyhow::Result<String> {
    let Some(recovery) = Page::<Recovery>::first(body, "recovery")? else {
        return Ok("No recovery data found for the specified date range.".to_string());
    };
    let score = recovery.score.unwrap_or_default();
    let recovery_score = or_zero(score.recovery_score);

    let skin_temp = score.skin_temp_celsius.map_or_else(
        || "N/A".to_string(),
        |c| format!("{c:.1}°C ({:.1}°F)", c * 9.0 / 5.0 + 32.0),
    );
    let spo2 = score
        .spo2_percentage
        .map_or_else(|| "N/A".to_string(), |p| p.to_string());

    Ok(format!(
        "Recovery Status: {band}\n\
         Recovery Score: {recovery_score}%\n\
         Date: {date}\n\
         Resting Heart Rate: {rhr} bpm\n\
         Heart Rate Variability: {hrv} ms\n\
         SPO2: {spo2}%\n\
         Skin Temperature: {skin_temp}\n\
         Based on: Last Sleep Session\n",
        band = recovery_band(recovery_score),
        date = human_date(recovery.created_at.as_deref(), DAY_FORMAT),
        rhr = or_zero(score.resting_heart_rate),
        hrv = or_zero(score.hrv_rmssd_milli),
    ))
}

/// Renders the first cycle record of a collection response.
///
/// # Errors
///
/// Returns an error if the body is not a cycle collection.
pub fn cycle(body: &Value) -> anyhow::Result<String> {
    let Some(cycle) = Page::<Cycle>::first(body, "cycle")? else {
        return Ok("No cycle data found for the specified date range.".to_string());
    };
    let score = cycle.score.unwrap_or_default();
    let strain = or_zero(score.strain);
    let kilojoules = or_zero(score.kilojoule);

    Ok(format!(
        "Day: {date}\n\
         Daily Strain Level: {level}\n\
         Daily Strain: {strain:.1}/21.0\n\
         Energy Expenditure: {kilojoules:.1} kJ ({kcal:.0} kcal)\n\
         Average Heart Rate: {avg} bpm\n\
         Max Heart Rate: {max} bpm\n\
         Status: {state}\n",
        date = human_date(cycle.start.as_deref(), DAY_FORMAT),
        level = strain_level(strain),
        kcal = kilojoules / KILOJOULES_PER_KCAL,
        avg = or_zero(score.average_heart_rate),
        max = or_zero(score.max_heart_rate),
        state = cycle.score_state.as_deref().unwrap_or(UNKNOWN),
    ))
}

/// Every sport id present in a workout collection.
///
/// # Errors
///
/// Returns an error if the body is not a workout collection.
pub fn workout_sports(body: &Value) -> anyhow::Result<Vec<i32>> {
    let page = Page::<Workout>::deserialize(body).context("unexpected workout response")?;
    Ok(page.records.into_iter().filter_map(|w| w.sport_id).collect())
}

fn first_workout(body: &Value) -> anyhow::Result<Option<Workout>> {
    if body.get("records").is_some() {
        Page::<Workout>::first(body, "workout")
    } else {
        Workout::deserialize(body)
            .map(Some)
            .context("unexpected workout response")
    }
}

#[allow(clippy::cast_precision_loss)] // workout lengths are far below 2^52 ms
fn elapsed_minutes(start: Option<&str>, end: Option<&str>) -> f64 {
    let (Some(start), Some(end)) = (start, end) else {
        return 0.0;
    };
    match (DateTime::parse_from_rfc3339(start), DateTime::parse_from_rfc3339(end)) {
        (Ok(start), Ok(end)) => (end - start).num_milliseconds() as f64 / MILLIS_PER_MINUTE,
        _ => 0.0,
    }
}

/// Renders one workout, naming its sport with `sport_name`.
///
/// # Errors
///
/// Returns an error if the body is not a workout document.
pub fn workout(body: &Value, sport_name: impl FnOnce(i32) -> String) -> anyhow::Result<String> {
    let Some(workout) = first_workout(body)? else {
        return Ok("No workout data found for the specified criteria.".to_string());
    };
    let score = workout.score.unwrap_or_default();
    let zones = score.zone_duration.unwrap_or_default();
    let strain = or_zero(score.strain);
    let kilojoules = or_zero(score.kilojoule);
    let duration = elapsed_minutes(workout.start.as_deref(), workout.end.as_deref());

    let distance = score.distance_meter.map_or_else(String::new, |meters| {
        format!(
            "Distance: {meters:.2}m ({:.2} miles)\n",
            meters / METERS_PER_MILE
        )
    });

    Ok(format!(
        "Workout: {sport} on {date}\n\
         Strain Level: {level}\n\
         Strain Score: {strain:.1}/21.0\n\
         Average Heart Rate: {avg} bpm\n\
         Max Heart Rate: {max} bpm\n\
         Duration: {duration:.1} minutes ({length})\n\
         Calories Burned: {kcal:.0} kcal ({kilojoules:.0} kJ)\n\
         {distance}\
         Started: {start}\n\
         Ended: {end}\n\
         Zone 1 (50-60%): {z1:.1} minutes\n\
         Zone 2 (60-70%): {z2:.1} minutes\n\
         Zone 3 (70-80%): {z3:.1} minutes\n\
         Zone 4 (80-90%): {z4:.1} minutes\n\
         Zone 5 (90-100%): {z5:.1} minutes\n",
        sport = sport_name(workout.sport_id.unwrap_or(0)),
        date = human_date(workout.start.as_deref(), DAY_FORMAT),
        level = strain_level(strain),
        avg = or_zero(score.average_heart_rate),
        max = or_zero(score.max_heart_rate),
        length = format!("{}h {}m", (duration / 60.0).trunc(), (duration % 60.0).trunc()),
        kcal = kilojoules / KILOJOULES_PER_KCAL,
        start = workout.start.as_deref().unwrap_or(UNKNOWN),
        end = workout.end.as_deref().unwrap_or(UNKNOWN),
        z1 = minutes(zones.zone_one_milli),
        z2 = minutes(zones.zone_two_milli),
        z3 = minutes(zones.zone_three_milli),
        z4 = minutes(zones.zone_four_milli),
        z5 = minutes(zones.zone_five_milli),
    ))
}

/// Renders the basic profile.
///
/// # Errors
///
/// Returns an error if the body is not a profile document.
pub fn profile(body: &Value) -> anyhow::Result<String> {
    let profile = Profile::deserialize(body).context("unexpected profile response")?;
    let member_since = profile.created_at.as_deref().map_or_else(
        || UNKNOWN.to_string(),
        |raw| {
            DateTime::parse_from_rfc3339(raw).map_or_else(
                |_| raw.to_string(),
                |dt| dt.format(MEMBER_SINCE_FORMAT).to_string(),
            )
        },
    );

    Ok(format!(
        "Name: {} {}\nEmail: {}\nMember Since: {member_since}\n",
        profile.first_name.as_deref().unwrap_or(UNKNOWN),
        profile.last_name.as_deref().unwrap_or(UNKNOWN),
        profile.email.as_deref().unwrap_or(UNKNOWN),
    ))
}

/// Renders body measurements in metric and imperial units.
///
/// # Errors
///
/// Returns an error if the body is not a measurement document.
pub fn body_measurement(body: &Value) -> anyhow::Result<String> {
    let body = BodyMeasurement::deserialize(body).context("unexpected body measurement response")?;
    let height_m = or_zero(body.height_meter);
    let inches = height_m * INCHES_PER_METER;
    let weight_kg = or_zero(body.weight_kilogram);

    Ok(format!(
        "Height: {cm:.1} cm ({feet}'{rest}\")\n\
         Weight: {weight_kg:.1} kg ({lbs:.1} lbs)\n\
         Max Heart Rate: {max} bpm\n",
        cm = height_m * 100.0,
        feet = (inches / 12.0).trunc(),
        rest = (inches % 12.0).round(),
        lbs = weight_kg * POUNDS_PER_KILOGRAM,
        max = or_zero(body.max_heart_rate),
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn sleep_record_rendered() {
        let body = json!({
            "records": [{
                "start": "2024-03-05T22:30:00.000Z",
                "end": "2024-03-06T06:30:00.000Z",
                "nap": false,
                "score": {
                    "sleep_performance_percentage": 98,
                    "sleep_efficiency_percentage": 91.6923,
                    "stage_summary": {
                        "total_in_bed_time_milli": 28_800_000,
                        "total_awake_time_milli": 1_800_000,
                        "total_light_sleep_time_milli": 14_400_000,
                        "total_slow_wave_sleep_time_milli": 5_400_000,
                        "total_rem_sleep_time_milli": 6_840_000,
                        "sleep_cycle_count": 4,
                        "disturbance_count": 12
                    }
                }
            }]
        });
        let text = sleep(&body).unwrap();
        let lines = lines(&text);
        assert_eq!(lines[0], "Sleep: Night Sleep on Tuesday, Mar 05, 2024");
        assert_eq!(lines[1], "Sleep Performance: 98%");
        assert_eq!(lines[2], "Sleep Efficiency: 91.7%");
        assert_eq!(lines[3], "Sleep Duration: 7.40 hours (7h 24m)");
        assert_eq!(lines[4], "Time in Bed: 8.00 hours (8h 0m)");
        assert_eq!(lines[7], "Light Sleep: 240.0 minutes");
        assert_eq!(lines[9], "REM Sleep: 114.0 minutes");
        assert_eq!(lines[11], "Sleep Cycles: 4");
        assert_eq!(lines[12], "Disturbances: 12");
    }

    #[test]
    fn unscored_nap_reads_as_zero() {
        let body = json!({"records": [{"start": "2024-03-05T13:00:00Z", "nap": true, "score": null}]});
        let text = sleep(&body).unwrap();
        assert!(text.starts_with("Sleep: Nap on Tuesday, Mar 05, 2024\n"));
        assert!(text.contains("Sleep Duration: 0.00 hours (0h 0m)"));
        assert!(text.contains("Ended: Unknown"));
    }

    #[test]
    fn empty_collections_say_so() {
        let empty = json!({"records": []});
        assert_eq!(
            sleep(&empty).unwrap(),
            "No sleep data found for the specified date range."
        );
        assert_eq!(
            recovery(&empty).unwrap(),
            "No recovery data found for the specified date range."
        );
        assert_eq!(
            cycle(&json!({})).unwrap(),
            "No cycle data found for the specified date range."
        );
        assert_eq!(
            workout(&empty, |id| format!("Sport {id}")).unwrap(),
            "No workout data found for the specified criteria."
        );
    }

    #[test]
    fn recovery_bands_and_temperature() {
        let body = json!({
            "records": [{
                "created_at": "2024-03-06T07:00:00.000Z",
                "score": {
                    "recovery_score": 72,
                    "resting_heart_rate": 51,
                    "hrv_rmssd_milli": 64.5,
                    "spo2_percentage": 96.5,
                    "skin_temp_celsius": 33.7
                }
            }]
        });
        let text = recovery(&body).unwrap();
        let lines = lines(&text);
        assert_eq!(lines[0], "Recovery Status: Green (High)");
        assert_eq!(lines[1], "Recovery Score: 72%");
        assert_eq!(lines[2], "Date: Wednesday, Mar 06, 2024");
        assert_eq!(lines[4], "Heart Rate Variability: 64.5 ms");
        assert_eq!(lines[5], "SPO2: 96.5%");
        assert_eq!(lines[6], "Skin Temperature: 33.7°C (92.7°F)");

        let low = json!({"records": [{"score": {"recovery_score": 20}}]});
        let text = recovery(&low).unwrap();
        assert!(text.starts_with("Recovery Status: Red (Low)"));
        assert!(text.contains("Skin Temperature: N/A"));
        assert!(text.contains("Date: Unknown Date"));
    }

    #[test]
    fn strain_levels_have_inclusive_lower_bounds() {
        assert_eq!(strain_level(18.0), "All Out (18.0-21.0)");
        assert_eq!(strain_level(17.99), "Strenuous (14.0-17.9)");
        assert_eq!(strain_level(10.0), "Moderate (10.0-13.9)");
        assert_eq!(strain_level(4.0), "Light (4.0-9.9)");
        assert_eq!(strain_level(3.9), "Minimal (0-3.9)");
        assert_eq!(recovery_band(67.0), "Green (High)");
        assert_eq!(recovery_band(34.0), "Yellow (Medium)");
    }

    #[test]
    fn cycle_rendered() {
        let body = json!({
            "records": [{
                "start": "2024-03-05T06:00:00Z",
                "end": null,
                "score_state": "SCORED",
                "score": {"strain": 12.34, "kilojoule": 8368, "average_heart_rate": 68, "max_heart_rate": 171}
            }]
        });
        let text = cycle(&body).unwrap();
        let lines = lines(&text);
        assert_eq!(lines[0], "Day: Tuesday, Mar 05, 2024");
        assert_eq!(lines[1], "Daily Strain Level: Moderate (10.0-13.9)");
        assert_eq!(lines[2], "Daily Strain: 12.3/21.0");
        assert_eq!(lines[3], "Energy Expenditure: 8368.0 kJ (2000 kcal)");
        assert_eq!(lines[6], "Status: SCORED");
    }

    #[test]
    fn single_workout_rendered_with_sport_name() {
        let body = json!({
            "id": "8a3b",
            "sport_id": 1,
            "start": "2024-03-05T17:00:00.000Z",
            "end": "2024-03-05T18:15:30.000Z",
            "score": {
                "strain": 14.2,
                "average_heart_rate": 150,
                "max_heart_rate": 182,
                "kilojoule": 2092,
                "distance_meter": 10_000,
                "zone_duration": {"zone_two_milli": 600_000, "zone_four_milli": 1_500_000}
            }
        });
        let text = workout(&body, |id| format!("Sport {id}")).unwrap();
        let lines = lines(&text);
        assert_eq!(lines[0], "Workout: Sport 1 on Tuesday, Mar 05, 2024");
        assert_eq!(lines[1], "Strain Level: Strenuous (14.0-17.9)");
        assert_eq!(lines[5], "Duration: 75.5 minutes (1h 15m)");
        assert_eq!(lines[6], "Calories Burned: 500 kcal (2092 kJ)");
        assert_eq!(lines[7], "Distance: 10000.00m (6.21 miles)");
        assert_eq!(lines[11], "Zone 2 (60-70%): 10.0 minutes");
        assert_eq!(lines[13], "Zone 4 (80-90%): 25.0 minutes");
    }

    #[test]
    fn workout_without_distance_skips_the_line() {
        let body = json!({"records": [{"sport_id": 47, "score": {"strain": 2.0}}]});
        let text = workout(&body, |_| "Yoga".to_string()).unwrap();
        assert!(text.starts_with("Workout: Yoga on Unknown Date\n"));
        assert!(!text.contains("Distance"));
        assert!(text.contains("Duration: 0.0 minutes (0h 0m)"));
    }

    #[test]
    fn workout_sport_ids_collected() {
        let body = json!({"records": [{"sport_id": 1}, {"sport_id": -1}, {}, {"sport_id": 1}]});
        assert_eq!(workout_sports(&body).unwrap(), vec![1, -1, 1]);
        assert!(workout_sports(&json!({"records": {}})).is_err());
    }

    #[test]
    fn profile_accepts_both_field_spellings() {
        let text = profile(&json!({
            "user_id": 10129,
            "email": "jsmith@whoop.com",
            "first_name": "John",
            "last_name": "Smith"
        }))
        .unwrap();
        assert_eq!(
            text,
            "Name: John Smith\nEmail: jsmith@whoop.com\nMember Since: Unknown\n"
        );

        let text = profile(&json!({"firstName": "Ada", "createdAt": "2021-07-04T12:00:00Z"})).unwrap();
        assert!(text.starts_with("Name: Ada Unknown\n"));
        assert!(text.ends_with("Member Since: July 04, 2021\n"));
    }

    #[test]
    fn body_measurement_converts_units() {
        let text = body_measurement(&json!({
            "height_meter": 1.75,
            "weight_kilogram": 90.7185,
            "max_heart_rate": 200
        }))
        .unwrap();
        assert_eq!(
            text,
            "Height: 175.0 cm (5'9\")\nWeight: 90.7 kg (200.0 lbs)\nMax Heart Rate: 200 bpm\n"
        );
    }

    #[test]
    fn wrong_shape_is_an_error() {
        assert!(sleep(&json!({"records": "nope"})).is_err());
        assert!(body_measurement(&json!("70kg")).is_err());
    }
}
