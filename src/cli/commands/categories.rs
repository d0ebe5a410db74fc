//! Category listing.

use console::style;

use crate::config::Settings;
use crate::models::Category;

/// Print every crawlable category with its slug and registry form.
pub fn cmd_categories(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("Categories").bold());
    println!("{}", "-".repeat(60));
    for category in Category::ALL.iter() {
        let form = settings
            .categories
            .form(*category)
            .map(|f| f.form_id.as_str())
            .unwrap_or("-");
        println!(
            "{:<24} {}  {}",
            style(category.slug()).cyan(),
            category.display_name(),
            style(form).dim()
        );
    }
    println!();
    Ok(())
}
