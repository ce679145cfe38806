use poct1_rs::{load_readings, summarize, TherapeuticRange};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let set = load_readings("inr_results.json")?;
    println!("{} reading(s) on file", set.len());

    let summary = summarize(set.readings(), TherapeuticRange::default());
    if let Some(ttr) = summary.ttr_percent {
        println!("Time in therapeutic range: {ttr:.1}%");
    }
    if let Some(mean) = summary.mean_inr {
        println!("Mean INR: {mean:.2}");
    }

    Ok(())
}
