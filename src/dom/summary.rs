use crate::errors::{DriverError, Result};
use scraper::{ElementRef, Html, Selector as CssSelector};
use serde::{Deserialize, Serialize};

const PROCUREMENT: &str = "ctl00_mpcphFormWizardFields_ucProcurement_";
const WIZARD: &str = "ctl00_mpcphFormWizardFields_";

/// The final review page of the offer wizard, as read before submitting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferSummary {
    pub acquisition_number: String,
    pub name: String,
    pub state: String,
    pub currency: String,
    pub buyer: String,
    pub buyer_notes: String,
    pub contact: String,
    pub phones: String,
    pub published_at: String,
    pub closes_at: String,
    pub opens_at: String,
    pub user_name: String,
    pub user_rut: String,
    pub social_reason: String,
    pub offer_name: String,
    pub offer_description: String,
    pub offered_at: String,
    pub offer_total: String,
    pub items: Vec<SummaryItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub item: String,
    pub onu: String,
    pub buyer_spec: String,
    pub quantity: String,
    pub offered_quantity: String,
    pub supplier_spec: String,
    pub unit_price: String,
    pub total: String,
}

fn css(selector: &str) -> Result<CssSelector> {
    CssSelector::parse(selector).map_err(|e| DriverError::from_any_error(format!("{:?}", e)))
}

fn clean_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn children<'a>(element: ElementRef<'a>, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
}

/// Rows of a table, looking through an implicit or explicit `<tbody>`.
fn rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut found: Vec<ElementRef<'_>> = children(table, "tr").collect();
    for body in children(table, "tbody") {
        found.extend(children(body, "tr"));
    }
    found
}

fn cell(row: Option<&ElementRef<'_>>, index: usize) -> String {
    row.and_then(|row| children(*row, "td").nth(index))
        .map(clean_text)
        .unwrap_or_default()
}

impl OfferSummary {
    pub fn parse(html: &str) -> Result<Self> {
        let document = Html::parse_document(html);
        let by_id = |id: String| -> Result<String> {
            let selector = css(&format!("[id='{}']", id))?;
            Ok(document
                .select(&selector)
                .next()
                .map(clean_text)
                .unwrap_or_default())
        };
        let procurement = |suffix: &str| by_id(format!("{}{}", PROCUREMENT, suffix));
        let wizard = |suffix: &str| by_id(format!("{}{}", WIZARD, suffix));

        let mut summary = OfferSummary {
            acquisition_number: procurement("hlNumberShow")?,
            name: procurement("lblNameShow")?,
            state: procurement("lblStateShow")?,
            currency: procurement("lblCurrencyShow")?,
            buyer: procurement("hlBuyerShow")?,
            buyer_notes: procurement("lblBuyerNotesShow")?,
            contact: procurement("lblContactShow")?,
            phones: procurement("lblPhonesShow")?,
            published_at: procurement("lblPublishDateShow")?,
            closes_at: procurement("lblEndDateShow")?,
            opens_at: procurement("lblOpeningDateShow")?,
            user_name: wizard("lblBIDProUserNameDesc")?,
            user_rut: wizard("lblBIDProRutDesc")?,
            social_reason: wizard("lblBIDProSocialReasonDesc")?,
            offer_name: wizard("lblBIDOfferNameDesc")?,
            offer_description: wizard("lblDescription")?,
            offered_at: wizard("lblBIDOfferDateTimeDesc")?,
            offer_total: wizard("lblBIDOfferTotalDesc")?,
            items: Vec::new(),
        };

        let block = css("table.cssBIDBidsBlockTable")?;
        let nested = css("table")?;
        for table in document.select(&block) {
            let table_rows = rows(table);
            let detail = table_rows
                .get(3)
                .and_then(|row| row.select(&nested).next())
                .map(rows)
                .unwrap_or_default();
            let detail_row = detail.get(1);

            summary.items.push(SummaryItem {
                item: cell(table_rows.first(), 0),
                onu: cell(table_rows.first(), 1),
                buyer_spec: cell(table_rows.get(1), 0),
                quantity: cell(table_rows.get(2), 0),
                offered_quantity: cell(detail_row, 0),
                supplier_spec: cell(detail_row, 1),
                unit_price: cell(detail_row, 2),
                total: cell(detail_row, 3),
            });
        }

        Ok(summary)
    }
}
