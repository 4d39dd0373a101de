use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{Service, ServiceId, Stylist, StylistId};

/// Services and stylists loaded from CSV exports, used to seed a directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    pub services: Vec<Service>,
    pub stylists: Vec<Stylist>,
}

/// Roster import failure.
#[derive(Debug, thiserror::Error)]
pub enum RosterImportError {
    #[error("failed to read roster export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid roster CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("stylist {stylist} lists unknown service {service}")]
    UnknownService { stylist: String, service: String },
    #[error("stylist {stylist} has rating {rating} outside 0..=5")]
    RatingOutOfRange { stylist: String, rating: f32 },
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn from_paths<P: AsRef<Path>>(
        services: P,
        stylists: P,
    ) -> Result<Roster, RosterImportError> {
        let services = std::fs::File::open(services)?;
        let stylists = std::fs::File::open(stylists)?;
        Self::from_readers(services, stylists)
    }

    /// Services: `id,name,duration_minutes`. Stylists: `id,name,rating,on_duty,expertise`
    /// with `;` between expertise service ids.
    pub fn from_readers<A: Read, B: Read>(
        services: A,
        stylists: B,
    ) -> Result<Roster, RosterImportError> {
        let services = parse_services(services)?;
        let known: BTreeSet<&ServiceId> = services.iter().map(|service| &service.id).collect();

        let mut roster_stylists = Vec::new();
        for row in read_rows::<_, StylistRow>(stylists)? {
            if !(0.0..=5.0).contains(&row.rating) {
                return Err(RosterImportError::RatingOutOfRange {
                    stylist: row.id,
                    rating: row.rating,
                });
            }

            let mut expertise = BTreeSet::new();
            for raw in row.expertise.split(';') {
                let raw = raw.trim();
                if raw.is_empty() {
                    continue;
                }
                let service = ServiceId(raw.to_string());
                if !known.contains(&service) {
                    return Err(RosterImportError::UnknownService {
                        stylist: row.id,
                        service: raw.to_string(),
                    });
                }
                expertise.insert(service);
            }

            roster_stylists.push(Stylist {
                id: StylistId(row.id),
                name: row.name,
                expertise,
                rating: row.rating,
                on_duty: row.on_duty,
            });
        }

        Ok(Roster {
            services,
            stylists: roster_stylists,
        })
    }
}

fn parse_services<R: Read>(reader: R) -> Result<Vec<Service>, RosterImportError> {
    Ok(read_rows::<_, ServiceRow>(reader)?
        .into_iter()
        .map(|row| Service {
            id: ServiceId(row.id),
            name: row.name,
            duration_minutes: row.duration_minutes,
        })
        .collect())
}

fn read_rows<R: Read, T: for<'de> Deserialize<'de>>(reader: R) -> Result<Vec<T>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader.deserialize::<T>().collect()
}

#[derive(Debug, Deserialize)]
struct ServiceRow {
    id: String,
    name: String,
    duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
struct StylistRow {
    id: String,
    name: String,
    rating: f32,
    #[serde(deserialize_with = "flexible_bool")]
    on_duty: bool,
    #[serde(default)]
    expertise: String,
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a yes/no value, got '{other}'"
        ))),
    }
}
