//! Where things live on the portal. Every selector the workflow uses is
//! declared here so a markup change is fixed in one place.

use crate::dom::TargetDescriptor;

pub const DESKTOP_URL: &str = "https://www.mercadopublico.cl/Portal/Modules/Desktop/Desktop.aspx?enc=";
pub const PAGER: &str = "wucPagerBID";
pub const PAGER_SYMBOLS: [&str; 2] = ["fnMovePage", "__doPostBack"];
pub const ATTACHMENT_FRAME: &str = "ctl00_mpcphFormWizardFields__IFrameAttachment";
pub const SAVED_OFFER_STATE: &str = "Guardada";
pub const DECLARATION_PENDING: &str = "PENDIENTE";
pub const ITEMS_PER_PAGE: u32 = 10;

const WIZARD: &str = "ctl00_mpcphFormWizardFields_";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZÁÉÍÓÚÑ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyzáéíóúñ";

/// XPath string literal for arbitrary text.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Case-insensitive `contains()` over the normalized text of `node`.
pub fn contains_text_ci(node: &str, needle: &str) -> String {
    format!(
        "contains(translate(normalize-space({}), '{}', '{}'), {})",
        node,
        UPPER,
        LOWER,
        xpath_literal(&needle.to_lowercase())
    )
}

fn wizard(id: &str) -> String {
    format!("{}{}", WIZARD, id)
}

// Login

pub fn queue_confirm() -> TargetDescriptor {
    TargetDescriptor::by_id("divConfirmRedirectModal").clickable()
}

pub fn login_button() -> TargetDescriptor {
    TargetDescriptor::new("Iniciar Sesión")
        .xpath("//button[text()=\"Iniciar Sesión\"]")
        .xpath("//button[contains(normalize-space(.), 'Iniciar Sesión')]")
        .clickable()
}

pub fn identity_provider_button() -> TargetDescriptor {
    TargetDescriptor::by_id("zocial-oidc").clickable()
}

pub fn username_field() -> TargetDescriptor {
    TargetDescriptor::by_id("uname").visible()
}

pub fn password_field() -> TargetDescriptor {
    TargetDescriptor::by_id("pword").visible()
}

pub fn login_submit() -> TargetDescriptor {
    TargetDescriptor::by_id("login-submit").clickable()
}

pub fn inline_login_error() -> TargetDescriptor {
    TargetDescriptor::new("inline login error")
        .css(".gob-response-error")
        .visible()
}

pub fn organization_modal() -> TargetDescriptor {
    TargetDescriptor::by_id("myModal").visible()
}

pub fn organization_row(unit_name: &str) -> TargetDescriptor {
    TargetDescriptor::new(format!("organization '{}'", unit_name))
        .xpath(format!(
            "//table[@id='tabla']/tbody/tr/td/div/label[@class='wrap-td'][{}]",
            contains_text_ci(".", unit_name)
        ))
        .xpath(format!(
            "//table[@id='tabla']//label[{}]",
            contains_text_ci(".", unit_name)
        ))
        .clickable()
}

pub fn organization_confirm() -> TargetDescriptor {
    TargetDescriptor::new("organization confirm")
        .xpath("//*[@id=\"myModal\"]/div/div/div[3]/a")
        .css("#myModal .modal-footer a")
        .clickable()
}

pub fn unit_container() -> TargetDescriptor {
    TargetDescriptor::new("unit container")
        .css(".unit-container")
        .clickable()
}

pub fn current_unit() -> TargetDescriptor {
    TargetDescriptor::by_css(".unidad")
}

pub fn unit_table() -> TargetDescriptor {
    TargetDescriptor::by_id("tblOrganismos")
}

/// The selection control of the unit row whose name contains `keyword`,
/// or of the first row when `keyword` is `None`.
pub fn unit_select_button(keyword: Option<&str>) -> TargetDescriptor {
    let row = match keyword {
        Some(keyword) => format!(
            "//table[@id='tblOrganismos']/tbody/tr[td[1][{}]]",
            contains_text_ci(".", keyword)
        ),
        None => "//table[@id='tblOrganismos']/tbody/tr[1]".to_string(),
    };
    TargetDescriptor::new(format!("unit row {}", keyword.unwrap_or("#1")))
        .xpath(format!("{}/td[2]//*[name()='svg']", row))
        .xpath(format!("{}/td[2]//button", row))
        .xpath(format!("{}/td[2]//a", row))
        .xpath(format!("{}/td[2]//*[@onclick]", row))
        .xpath(format!("{}/td[last()]//*[name()='svg']", row))
        .xpath(row)
}

// Search listing

pub fn unsent_offers_modal() -> TargetDescriptor {
    TargetDescriptor::by_id("modalOfertasNoEnviadas").visible()
}

pub fn unsent_offers_close() -> TargetDescriptor {
    TargetDescriptor::new("close unsent offers")
        .css("#modalOfertasNoEnviadas button.close")
        .css("button.close")
        .clickable()
}

pub fn tender_code_field() -> TargetDescriptor {
    TargetDescriptor::by_id("txtProcCode").visible()
}

pub fn search_button() -> TargetDescriptor {
    TargetDescriptor::by_id("btnSearchByCode").clickable()
}

pub fn view_offers() -> TargetDescriptor {
    TargetDescriptor::new("Ver Ofertas")
        .css("input[title='Ver Ofertas']")
        .xpath("//input[@title='Ver Ofertas' or @value='Ver Ofertas']")
        .clickable()
}

pub fn existing_offer_edit() -> TargetDescriptor {
    TargetDescriptor::by_id("rptDetail_ctl01_imgEdit")
}

pub fn existing_offer_state() -> TargetDescriptor {
    TargetDescriptor::by_id("rptDetail_ctl01_lblrptStatus")
}

pub fn new_offer() -> TargetDescriptor {
    TargetDescriptor::by_id("btnNewBid").clickable()
}

// Offer form

pub fn offer_name() -> TargetDescriptor {
    TargetDescriptor::by_id(wizard("txtBIDName")).visible()
}

pub fn offer_description() -> TargetDescriptor {
    TargetDescriptor::new("offer description")
        .id(format!("wysiwyg{}EditZone", WIZARD))
        .id(wizard("EditZone"))
        .id(wizard("txtDescription"))
        .id(wizard("txtBIDDescription"))
}

pub fn joint_offer_row() -> TargetDescriptor {
    TargetDescriptor::by_id(wizard("Tr1"))
}

pub fn joint_offer_choice(joint: bool) -> TargetDescriptor {
    let id = if joint { "rbactivaUtp" } else { "rbdesactivaUtp" };
    TargetDescriptor::by_id(wizard(id)).clickable()
}

/// The wizard's next button as found on pages where its markup varies.
pub fn wizard_next_anywhere() -> TargetDescriptor {
    TargetDescriptor::new("wizard next")
        .id("ctl00_btnNext")
        .xpath("//td[contains(@class, 'cssFwkWizTDNavigationBtn')]//input[contains(@id, 'btnNext')]")
        .xpath("//input[@value='Siguiente' or @value='Next']")
        .xpath("//button[contains(text(), 'Siguiente')]")
        .xpath("//a[contains(text(), 'Siguiente')]")
        .css("input[id*='btnNext']")
        .clickable()
}

// Line items

pub fn no_bids_toggle() -> TargetDescriptor {
    TargetDescriptor::by_id(wizard("chkNoBids")).clickable()
}

pub fn no_bids_checked_script() -> String {
    format!(
        "(function() {{ const el = document.getElementById('{}'); return !!(el && el.checked); }})()",
        wizard("chkNoBids")
    )
}

pub fn move_page_script(page: u32) -> String {
    format!("fnMovePage({},\"{}\");", page, PAGER)
}

pub fn postback_page_script(page: u32) -> String {
    format!("__doPostBack('{}$ctl{:02}', '');", PAGER, page)
}

/// Defines `fnMovePage` on top of `__doPostBack` when the page lost it.
pub const MOVE_PAGE_SHIM: &str = r#"
if (typeof fnMovePage === 'undefined' && typeof __doPostBack === 'function') {
    window.fnMovePage = function(pageNumber, pagerName) {
        __doPostBack(pagerName + '$ctl' + pageNumber.toString().padStart(2, '0'), '');
    };
}
"#;

/// The pager renders the current page as a plain span and every other
/// page as a link, so this matches only once `page` is showing.
pub fn current_page(page: u32) -> TargetDescriptor {
    TargetDescriptor::new(format!("pager on page {}", page)).xpath(format!(
        "//span[contains(@class, 'pager') and text()='{}']",
        page
    ))
}

pub fn item_radio(slot: &str) -> TargetDescriptor {
    TargetDescriptor::new(format!("item {} radio", slot))
        .id(wizard(&format!("rptBids_ctl{}_rblBids_0", slot)))
        .id(format!("rptBids_ctl{}_rblBids_0", slot))
        .attr_contains("id", format!("rptBids_ctl{}_rblBids_0", slot))
        .xpath(format!("//input[@type='radio' and contains(@id, 'ctl{}')]", slot))
}

pub fn item_comment(slot: &str) -> TargetDescriptor {
    TargetDescriptor::new(format!("item {} comment", slot))
        .id(wizard(&format!("rptBids_ctl{}__TxtSupplierComment", slot)))
        .id(format!("rptBids_ctl{}__TxtSupplierComment", slot))
        .attr_contains("id", format!("rptBids_ctl{}__TxtSupplierComment", slot))
}

pub fn item_price(slot: &str) -> TargetDescriptor {
    TargetDescriptor::new(format!("item {} price", slot))
        .id(wizard(&format!("rptBids_ctl{}__TxtUnitNetPriceN", slot)))
        .id(format!("rptBids_ctl{}__TxtUnitNetPriceN", slot))
        .attr_contains("id", format!("rptBids_ctl{}__TxtUnitNetPrice", slot))
}

/// Clicks the first visible control whose label reads like "next".
pub const EMERGENCY_NEXT_SCRIPT: &str = r#"
(function() {
    const words = ['next', 'siguiente', 'continuar'];
    const nodes = document.querySelectorAll("input[type='submit'], input[type='button'], button, a[href^='javascript']");
    for (const node of nodes) {
        const label = (node.value || node.innerText || node.title || '').toLowerCase();
        if (words.some(w => label.includes(w))) {
            node.click();
            return true;
        }
    }
    return false;
})()
"#;

// Attachments and signature

pub fn attachments_tab() -> TargetDescriptor {
    TargetDescriptor::by_id("ctl00_trvWizardt3")
}

pub fn attachments_frame() -> TargetDescriptor {
    TargetDescriptor::by_id(ATTACHMENT_FRAME)
}

pub fn declaration_state() -> TargetDescriptor {
    TargetDescriptor::by_id("dj_estado").in_frame(ATTACHMENT_FRAME)
}

pub fn declare_and_sign() -> TargetDescriptor {
    TargetDescriptor::new("Declarar y firmar")
        .xpath("//a[contains(., 'Declarar y firmar')]")
        .in_frame(ATTACHMENT_FRAME)
        .clickable()
}

pub fn representative_dropdown() -> TargetDescriptor {
    TargetDescriptor::new("representative dropdown")
        .attr_contains("class", "MuiSelect-select")
        .xpath("/html/body/div[2]/div/div/div/div[2]/div/div/div/div/div/div[1]/div/div[1]/div/div")
        .xpath("/html/body/div[2]/div/div/div/div[1]/div/div/div/div/div/div[1]/div/div[1]/div/div")
        .attr_contains("class", "MuiInputBase-input")
        .xpath("//div[text()='Seleccione...']")
}

pub fn representative_selected(rut: &str) -> TargetDescriptor {
    TargetDescriptor::by_xpath(format!(
        "//div[contains(text(), {}) and contains(@class, 'selected')]",
        xpath_literal(rut)
    ))
}

pub fn representative_options(rut: &str) -> Vec<TargetDescriptor> {
    let rut = xpath_literal(rut);
    vec![
        TargetDescriptor::by_xpath(format!("//div[contains(text(), {})]", rut)).clickable(),
        TargetDescriptor::by_xpath(format!("//li[contains(text(), {})]", rut)).clickable(),
        TargetDescriptor::by_xpath(format!("//*[@data-value={}]", rut)).clickable(),
        TargetDescriptor::by_xpath(format!("//*[contains(@title, {})]", rut)).clickable(),
    ]
}

pub fn other_rut_option() -> TargetDescriptor {
    TargetDescriptor::new("Otro RUT")
        .xpath("//div[contains(text(), 'Otro RUT')]")
        .xpath("//li[contains(text(), 'Otro RUT')]")
        .xpath("//*[contains(text(), 'Otro') and contains(text(), 'RUT')]")
        .clickable()
}

pub fn other_rut_input() -> TargetDescriptor {
    TargetDescriptor::new("other RUT input")
        .attr_contains("class", "MuiInputBase-inputAdornedEnd")
        .xpath("//input[@type='text']")
        .xpath("//input[contains(@class, 'MuiInputBase-input')]")
        .clickable()
}

/// Ticks every enabled declaration toggle that is not yet checked and
/// reports the counts seen before clicking.
pub const DECLARATION_TOGGLES_SCRIPT: &str = r#"
(function() {
    const inputs = Array.from(document.querySelectorAll("input[class*='fKMtys']"));
    let enabled = 0, checked = 0;
    for (const input of inputs) {
        const holder = input.parentElement ? input.parentElement.className : '';
        const classes = typeof holder === 'string' ? holder : '';
        if (classes.includes('disabled')) continue;
        enabled += 1;
        if (classes.includes('Mui-checked')) { checked += 1; continue; }
        input.scrollIntoView(true);
        input.click();
    }
    return { total: inputs.length, enabled: enabled, checked: checked };
})()
"#;

pub fn sign_without_idp() -> TargetDescriptor {
    TargetDescriptor::new("Firmar sin Clave Única")
        .xpath("//button[contains(@class, 'EaXFo') and contains(text(), 'Firmar sin Clave Única')]")
        .xpath("//button[contains(text(), 'Firmar sin Clave Única')]")
        .clickable()
}

pub fn confirm_sign_without_idp() -> TargetDescriptor {
    TargetDescriptor::new("confirm Firmar sin Clave Única")
        .xpath("//button[contains(@class, 'hOvxpq') and contains(text(), 'Firmar sin Clave Única')]")
        .xpath("(//button[contains(text(), 'Firmar sin Clave Única')])[last()]")
}

pub fn close_and_return() -> TargetDescriptor {
    TargetDescriptor::new("Cerrar y volver a la oferta")
        .xpath("//button[contains(@class, 'EaXFo') and contains(text(), 'Cerrar y volver a la oferta')]")
        .xpath("//button[contains(text(), 'Cerrar y volver')]")
}

pub const SITE_KEY_SCRIPT: &str = "(function() { const el = document.getElementById('login-submit'); return el ? el.getAttribute('data-sitekey') : null; })()";

pub const IDP_SUBMIT_SCRIPT: &str = "onSubmit()";

// Documents

pub fn document_input(suffix: &str) -> TargetDescriptor {
    TargetDescriptor::by_id(format!("browse_local_{}_file", suffix)).in_frame(ATTACHMENT_FRAME)
}

pub fn document_add(suffix: &str) -> TargetDescriptor {
    TargetDescriptor::by_id(format!("add_local_{}_files", suffix))
        .in_frame(ATTACHMENT_FRAME)
}

pub fn upload_confirmation() -> TargetDescriptor {
    TargetDescriptor::by_css(".mensaje_info_agregar").in_frame(ATTACHMENT_FRAME)
}

fn in_attachment_frame(body: &str) -> String {
    format!(
        "(function() {{ const f = document.getElementById('{}'); const root = (f && f.contentDocument) || document; {} }})()",
        ATTACHMENT_FRAME, body
    )
}

pub fn remove_attached_script() -> String {
    in_attachment_frame(
        "const buttons = root.querySelectorAll('span.remove_image'); buttons.forEach(b => b.click()); return buttons.length;",
    )
}

pub fn attached_names_script() -> String {
    in_attachment_frame(
        "return Array.from(root.querySelectorAll('#added_chp_doc_list li span.nameDocumentoAgregado')).map(s => s.innerHTML);",
    )
}

// Final review

pub const PAGE_HTML_SCRIPT: &str = "document.documentElement.outerHTML";

pub fn enter_offer() -> TargetDescriptor {
    TargetDescriptor::by_id(wizard("btnEnterOffer"))
}

pub fn review_indicators() -> Vec<TargetDescriptor> {
    vec![enter_offer(), TargetDescriptor::by_css("table.cssBIDBidsBlockTable")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("farma"), "'farma'");
        assert_eq!(xpath_literal("d'Acme"), "\"d'Acme\"");
        assert_eq!(
            xpath_literal("a'b\"c"),
            "concat('a', \"'\", 'b\"c')"
        );
    }

    #[test]
    fn test_pager_scripts() {
        assert_eq!(move_page_script(2), "fnMovePage(2,\"wucPagerBID\");");
        assert_eq!(postback_page_script(3), "__doPostBack('wucPagerBID$ctl03', '');");
        let marker: Vec<String> = current_page(2).selectors().map(|s| s.to_string()).collect();
        assert_eq!(marker, vec!["xpath=//span[contains(@class, 'pager') and text()='2']"]);
    }

    #[test]
    fn test_item_targets_use_slot_key() {
        let keys: Vec<String> = item_price("07").selectors().map(|s| s.to_string()).collect();
        assert_eq!(
            keys[0],
            "id=ctl00_mpcphFormWizardFields_rptBids_ctl07__TxtUnitNetPriceN"
        );
        assert_eq!(item_radio("00").len(), 4);
        assert_eq!(
            keys[2],
            "attr[id*=rptBids_ctl07__TxtUnitNetPrice]"
        );
    }

    #[test]
    fn test_unit_keyword_is_case_folded() {
        let target = unit_select_button(Some("FARMA"));
        let first = target.selectors().next().unwrap().to_string();
        assert!(first.contains("'farma'"));
        assert!(first.starts_with("xpath=//table[@id='tblOrganismos']/tbody/tr[td[1]["));
    }
}
