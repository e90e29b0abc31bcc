use std::collections::HashMap;

use crate::models::{
    AgeBracketCount, ClientAnalysis, ClientSummary, CrmReport, EnrichedAppointments, GenderCount,
    COL_AGE, COL_CLIENT, COL_GENDER,
};

/// Left-closed age bins and their display labels.
const AGE_BINS: [(f64, f64, &str); 6] = [
    (0.0, 18.0, "0-18"),
    (18.0, 25.0, "19-25"),
    (25.0, 35.0, "26-35"),
    (35.0, 45.0, "36-45"),
    (45.0, 60.0, "46-60"),
    (60.0, 100.0, "60+"),
];

pub fn analyze_clients(enriched: &EnrichedAppointments) -> CrmReport {
    if enriched.is_empty() || !enriched.has_column(COL_CLIENT) {
        return CrmReport::default();
    }
    let include_age = enriched.has_column(COL_AGE);
    let include_gender = enriched.has_column(COL_GENDER);

    // Insertion order is kept so that the final stable sort breaks spend
    // ties by first appearance.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, ClientSummary> = HashMap::new();

    for row in &enriched.rows {
        let appointment = &row.appointment;
        if appointment.client.is_empty() {
            continue;
        }
        let summary = groups.entry(appointment.client.clone()).or_insert_with(|| {
            order.push(appointment.client.clone());
            ClientSummary {
                client: appointment.client.clone(),
                total_spend: 0.0,
                visits: 0,
                average_ticket: 0.0,
                age: None,
                gender: None,
                last_visit: None,
            }
        });

        summary.total_spend += row.sale_price;
        summary.visits += 1;
        if appointment.date > summary.last_visit {
            summary.last_visit = appointment.date;
        }
        if include_age && summary.age.is_none() {
            summary.age = appointment.age;
        }
        if include_gender && summary.gender.is_none() {
            summary.gender = appointment.gender.clone();
        }
    }

    let mut clients: Vec<ClientSummary> = order
        .into_iter()
        .filter_map(|name| groups.remove(&name))
        .map(|mut summary| {
            summary.average_ticket = if summary.visits > 0 {
                summary.total_spend / summary.visits as f64
            } else {
                0.0
            };
            summary
        })
        .collect();
    clients.sort_by(|a, b| b.total_spend.total_cmp(&a.total_spend));

    CrmReport {
        include_age,
        include_gender,
        clients,
    }
}

/// Clients per gender, most common first. Clients without a gender are not
/// counted.
pub fn gender_distribution(report: &CrmReport) -> Vec<GenderCount> {
    if !report.include_gender {
        return Vec::new();
    }
    let mut counts: Vec<GenderCount> = Vec::new();
    for client in &report.clients {
        let Some(gender) = client.gender.as_deref() else {
            continue;
        };
        match counts.iter_mut().find(|c| c.gender == gender) {
            Some(existing) => existing.count += 1,
            None => counts.push(GenderCount {
                gender: gender.to_string(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Clients per age bracket, every bracket listed in order.
pub fn age_brackets(report: &CrmReport) -> Vec<AgeBracketCount> {
    if !report.include_age {
        return Vec::new();
    }
    AGE_BINS
        .iter()
        .map(|&(low, high, label)| AgeBracketCount {
            label: label.to_string(),
            count: report
                .clients
                .iter()
                .filter_map(|c| c.age)
                .filter(|&age| age >= low && age < high)
                .count(),
        })
        .collect()
}

pub fn client_analysis(enriched: &EnrichedAppointments) -> ClientAnalysis {
    let report = analyze_clients(enriched);
    ClientAnalysis {
        genders: gender_distribution(&report),
        age_brackets: age_brackets(&report),
        report,
    }
}
