//! Static table definitions for the trip datasets.
//!
//! Schemas are declared rather than inferred so every monthly file lands with
//! the same column types regardless of what a given month happens to contain.

use super::DatasetKind;
use crate::warehouse::{FieldType, SchemaField};

/// Destination table id for a dataset kind, e.g. `yellow_tripdata`.
pub fn table_name(kind: DatasetKind) -> String {
    format!("{}_tripdata", kind)
}

/// Event-time column used for day partitioning (trip drop-off time).
pub fn partition_field(kind: DatasetKind) -> &'static str {
    match kind {
        DatasetKind::Yellow => "tpep_dropoff_datetime",
        DatasetKind::Green => "lpep_dropoff_datetime",
    }
}

const VENDOR: &str = "A code indicating the provider that provided the record. 1= Creative Mobile Technologies, LLC; 2= VeriFone Inc.";
const RATECODE: &str = "The final rate code in effect at the end of the trip. 1= Standard rate 2=JFK 3=Newark 4=Nassau or Westchester 5=Negotiated fare 6=Group ride";
const PAYMENT: &str = "1= Credit card 2= Cash 3= No charge 4= Dispute 5= Unknown 6= Voided trip";

/// Column list for a dataset kind, in file order.
pub fn schema_for(kind: DatasetKind) -> Vec<SchemaField> {
    use FieldType::{Int64, Numeric, String as Str, Timestamp};

    let f = SchemaField::new;
    match kind {
        DatasetKind::Yellow => vec![
            f("VendorID", Str, VENDOR),
            f("tpep_pickup_datetime", Timestamp, "The date and time when the meter was engaged"),
            f("tpep_dropoff_datetime", Timestamp, "The date and time when the meter was disengaged"),
            f("passenger_count", Int64, "The number of passengers in the vehicle. This is a driver-entered value."),
            f("trip_distance", Numeric, "The elapsed trip distance in miles reported by the taximeter."),
            f("RatecodeID", Str, RATECODE),
            f("store_and_fwd_flag", Str, "TRUE = store and forward trip, FALSE = not a store and forward trip"),
            f("PULocationID", Str, "TLC Taxi Zone in which the taximeter was engaged"),
            f("DOLocationID", Str, "TLC Taxi Zone in which the taximeter was disengaged"),
            f("payment_type", Int64, PAYMENT),
            f("fare_amount", Numeric, "The time-and-distance fare calculated by the meter"),
            f("extra", Numeric, "Miscellaneous extras and surcharges."),
            f("mta_tax", Numeric, "$0.50 MTA tax that is automatically triggered based on the metered rate in use"),
            f("tip_amount", Numeric, "Tip amount (credit card only). Cash tips are not included."),
            f("tolls_amount", Numeric, "Total amount of all tolls paid in trip."),
            f("improvement_surcharge", Numeric, "$0.30 improvement surcharge assessed on hailed trips at the flag drop."),
            f("total_amount", Numeric, "The total amount charged to passengers. Does not include cash tips."),
            f("congestion_surcharge", Numeric, "Congestion surcharge applied to trips in congested zones"),
        ],
        DatasetKind::Green => vec![
            f("VendorID", Str, VENDOR),
            f("lpep_pickup_datetime", Timestamp, "The date and time when the meter was engaged"),
            f("lpep_dropoff_datetime", Timestamp, "The date and time when the meter was disengaged"),
            f("store_and_fwd_flag", Str, "Y= store and forward trip N= not a store and forward trip"),
            f("RatecodeID", Str, RATECODE),
            f("PULocationID", Str, "TLC Taxi Zone in which the taximeter was engaged"),
            f("DOLocationID", Str, "TLC Taxi Zone in which the taximeter was disengaged"),
            f("passenger_count", Int64, "The number of passengers in the vehicle. This is a driver-entered value."),
            f("trip_distance", Numeric, "The elapsed trip distance in miles reported by the taximeter."),
            f("fare_amount", Numeric, "The time-and-distance fare calculated by the meter"),
            f("extra", Numeric, "Miscellaneous extras and surcharges. Currently, this only includes the $0.50 and $1 rush hour and overnight charges"),
            f("mta_tax", Numeric, "$0.50 MTA tax that is automatically triggered based on the metered rate in use"),
            f("tip_amount", Numeric, "Tip amount. This field is automatically populated for credit card tips. Cash tips are not included."),
            f("tolls_amount", Numeric, "Total amount of all tolls paid in trip."),
            f("ehail_fee", Numeric, ""),
            f("improvement_surcharge", Numeric, "$0.30 improvement surcharge assessed on hailed trips at the flag drop. The improvement surcharge began being levied in 2015."),
            f("total_amount", Numeric, "The total amount charged to passengers. Does not include cash tips."),
            f("payment_type", Int64, PAYMENT),
            f("trip_type", Str, "1= Street-hail 2= Dispatch"),
            f("congestion_surcharge", Numeric, "Congestion surcharge applied to trips in congested zones"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_field_is_declared_as_timestamp() {
        for kind in [DatasetKind::Yellow, DatasetKind::Green] {
            let schema = schema_for(kind);
            let field = schema
                .iter()
                .find(|f| f.name == partition_field(kind))
                .expect("partition field in schema");
            assert_eq!(field.field_type, FieldType::Timestamp);
        }
    }

    #[test]
    fn column_names_are_unique() {
        for kind in [DatasetKind::Yellow, DatasetKind::Green] {
            let schema = schema_for(kind);
            let mut names: Vec<&str> = schema.iter().map(|f| f.name.as_str()).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), schema.len());
        }
    }

    #[test]
    fn table_names() {
        assert_eq!(table_name(DatasetKind::Yellow), "yellow_tripdata");
        assert_eq!(table_name(DatasetKind::Green), "green_tripdata");
    }
}
