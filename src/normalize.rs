//! Row normalization.
//!
//! Turns a [`RawRecord`] into a [`NormalizedRecord`]. Pure and infallible:
//! missing columns come through as empty strings and an unparseable date of
//! birth as `None`; later stages decide whether that is acceptable.
//!
//! Columns the profile does not name (contact person, place type, document
//! type tags and so on) never reach the typed record, but the full row is
//! kept verbatim in [`NormalizedRecord::raw`].

use crate::models::{
    Gender, InsureeDetails, LocationCandidates, LocationTriple, NormalizedRecord, RawRecord,
};
use crate::profile::ImportProfile;

pub fn normalize(raw: &RawRecord, profile: &ImportProfile) -> NormalizedRecord {
    let cols = &profile.columns;
    let field = |name: &str| raw.get(name).to_string();

    let health_facility = raw.get(&cols.health_facility);
    let place_of_birth = if health_facility.is_empty() {
        field(&cols.birth_city)
    } else {
        health_facility.to_string()
    };

    let dob_text = field(&cols.date_of_birth);
    let residence = LocationTriple::new(
        raw.get(&cols.residential_lga),
        raw.get(&cols.residential_district),
        raw.get(&cols.residential_village),
    );

    let details = InsureeDetails {
        last_name: field(&cols.family_name),
        other_names: field(&cols.given_name),
        dob: profile.dob_format.parse(&dob_text),
        gender: Gender::from_sex(raw.get(&cols.sex)),
        head: true,
        phone: field(&cols.mobile_number),
        email: field(&cols.email),
        occupation: field(&cols.occupation),
        father_name: full_name(
            raw.get(&cols.father_given_name),
            raw.get(&cols.father_family_name),
        ),
        mother_name: full_name(
            raw.get(&cols.mother_given_name),
            raw.get(&cols.mother_family_name),
        ),
        place_of_birth,
        is_local: raw.get(&cols.nationality) == raw.get(&cols.country_of_birth),
        certificate_number: field(&cols.certificate_number),
        registration_date: field(&cols.registration_date),
        residential_alley: field(&cols.residential_alley),
        residential_house_number: field(&cols.residential_house_number),
        residential_lga: residence.lga.clone(),
        residential_district: residence.district.clone(),
        residential_village: residence.village.clone(),
    };

    let photo = raw.get(&cols.photo);

    NormalizedRecord {
        chf_id: field(&cols.nin),
        details,
        locations: LocationCandidates {
            residence,
            registration: LocationTriple::new(
                raw.get(&cols.registration_lga),
                raw.get(&cols.registration_district),
                raw.get(&cols.registration_village),
            ),
        },
        photo: (!photo.is_empty()).then(|| photo.to_string()),
        dob_text,
        raw: raw.to_json(),
    }
}

fn full_name(given: &str, family: &str) -> String {
    format!("{} {}", given, family).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ecrvs_row() -> RawRecord {
        [
            ("nin", " 123456789015 "),
            ("familyName", "Jallow"),
            ("givenName", "Fatou"),
            ("dateOfBirth", "1990-03-14"),
            ("sex", "FEMALE"),
            ("mobileNumber", "+220 555 0101"),
            ("fatherGivenName", "Lamin"),
            ("fatherFamilyName", "Jallow"),
            ("motherGivenName", "Awa"),
            ("motherFamilyName", "Ceesay"),
            ("nationality", "Gambian"),
            ("countryOfBirth", "Gambian"),
            ("birthCity", "Serekunda"),
            ("healthFacility", ""),
            ("registrationLga", "Banjul"),
            ("registrationDistrict", "Banjul Central"),
            ("registrationVillage", "Half Die"),
            ("residentialLga", "Kanifing"),
            ("residentialDistrict", "Kanifing East"),
            ("residentialVillage", "Bakau"),
            ("contactPerson", "Ousman Jallow"),
            ("documentType", "birth-certificate"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_renames_and_derived_fields() {
        let record = normalize(&ecrvs_row(), &ImportProfile::default());
        assert_eq!(record.chf_id, "123456789015");
        assert_eq!(record.details.last_name, "Jallow");
        assert_eq!(record.details.other_names, "Fatou");
        assert_eq!(record.details.phone, "+220 555 0101");
        assert_eq!(record.details.gender, Gender::Female);
        assert!(record.details.head);
        assert_eq!(record.details.father_name, "Lamin Jallow");
        assert_eq!(record.details.mother_name, "Awa Ceesay");
        assert!(record.details.is_local);
        assert_eq!(record.details.place_of_birth, "Serekunda");
        assert_eq!(record.details.dob, NaiveDate::from_ymd_opt(1990, 3, 14));
        assert_eq!(record.details.residential_village, "Bakau");
        assert_eq!(record.locations.registration.village, "Half Die");
        assert_eq!(record.photo, None);
    }

    #[test]
    fn test_health_facility_wins_place_of_birth() {
        let mut row = ecrvs_row();
        row.insert("healthFacility", "Royal Victoria Teaching Hospital");
        let record = normalize(&row, &ImportProfile::default());
        assert_eq!(
            record.details.place_of_birth,
            "Royal Victoria Teaching Hospital"
        );
    }

    #[test]
    fn test_is_local_compares_nationality_to_birth_country() {
        let mut row = ecrvs_row();
        row.insert("nationality", "Senegalese");
        let record = normalize(&row, &ImportProfile::default());
        assert!(!record.details.is_local);
    }

    #[test]
    fn test_unknown_sex_maps_to_other() {
        let mut row = ecrvs_row();
        row.insert("sex", "female");
        let record = normalize(&row, &ImportProfile::default());
        assert_eq!(record.details.gender, Gender::Other);
    }

    #[test]
    fn test_raw_payload_keeps_every_trimmed_field() {
        let row: RawRecord = [
            ("nin", "  123456789015"),
            ("contactPerson", " Ousman "),
            ("unexpected", "kept\t"),
        ]
        .into_iter()
        .collect();
        let record = normalize(&row, &ImportProfile::default());
        let raw = record.raw.as_object().unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw["nin"], "123456789015");
        assert_eq!(raw["contactPerson"], "Ousman");
        assert_eq!(raw["unexpected"], "kept");
    }

    #[test]
    fn test_missing_columns_become_empty() {
        let record = normalize(&RawRecord::new(), &ImportProfile::default());
        assert_eq!(record.chf_id, "");
        assert_eq!(record.details.father_name, "");
        assert_eq!(record.details.dob, None);
        assert!(!record.locations.residence.is_complete());
        assert!(record.details.is_local);
    }

    #[test]
    fn test_dob_format_follows_profile() {
        let row: RawRecord = [("date_of_birth", "14/03/1990"), ("nin", "1")]
            .into_iter()
            .collect();
        let legacy = normalize(&row, &ImportProfile::legacy());
        assert_eq!(legacy.details.dob, NaiveDate::from_ymd_opt(1990, 3, 14));

        let mut iso = ImportProfile::legacy();
        iso.dob_format = crate::profile::DobFormat::Iso;
        let unparsed = normalize(&row, &iso);
        assert_eq!(unparsed.details.dob, None);
        assert_eq!(unparsed.dob_text, "14/03/1990");
    }

    #[test]
    fn test_legacy_columns() {
        let row: RawRecord = [
            ("national_subdivision", "Banjul"),
            ("district", "Banjul Central"),
            ("city", "Half Die"),
            ("family_name", "Touray"),
            ("given_name", "Modou"),
            ("father_name", "Ebrima"),
            ("father_lastname", "Touray"),
            ("sex", "MALE"),
        ]
        .into_iter()
        .collect();
        let record = normalize(&row, &ImportProfile::legacy());
        assert_eq!(record.locations.registration.lga, "Banjul");
        assert_eq!(record.locations.registration.village, "Half Die");
        assert_eq!(record.details.place_of_birth, "Half Die");
        assert_eq!(record.details.father_name, "Ebrima Touray");
        assert_eq!(record.details.gender, Gender::Male);
    }
}
