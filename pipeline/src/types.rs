use serde::{Deserialize, Serialize};

pub(crate) const DROP_HOUSING_TABLE: &str = "DROP TABLE IF EXISTS tbl_housing_data";

pub(crate) const CREATE_HOUSING_TABLE: &str = "CREATE TABLE IF NOT EXISTS tbl_housing_data (
    id INTEGER,
    MedInc REAL,
    HouseAge REAL,
    AveRooms REAL,
    AveBedrms REAL,
    Population REAL,
    AveOccup REAL,
    Latitude REAL,
    Longitude REAL,
    MedHouseVal REAL
)";

pub(crate) const INSERT_HOUSING_RECORD: &str = "INSERT INTO tbl_housing_data
    (id, MedInc, HouseAge, AveRooms, AveBedrms, Population, AveOccup, Latitude, Longitude, MedHouseVal)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

/// One row of the California housing dataset. Field names follow the CSV
/// header; `id` may be absent from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct HousingRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub MedInc: Option<f64>,
    pub HouseAge: Option<f64>,
    pub AveRooms: Option<f64>,
    pub AveBedrms: Option<f64>,
    pub Population: Option<f64>,
    pub AveOccup: Option<f64>,
    pub Latitude: Option<f64>,
    pub Longitude: Option<f64>,
    pub MedHouseVal: Option<f64>,
}
