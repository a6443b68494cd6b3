use crate::dto::assessment_dto::AssessmentResultRow;
use crate::error::Result;
use crate::models::assessment::Assessment;
use rust_xlsxwriter::*;

pub struct ExportService;

impl ExportService {
    /// Share of the maximum mark, or `None` when the assessment carries no marks.
    fn percentage(score: f64, max: f64) -> Option<f64> {
        (max > 0.0).then(|| score / max * 100.0)
    }
}

impl ExportService {
    /// Styled XLSX workbook of every submission for one assessment.
    pub fn generate_results_xlsx(
        assessment: &Assessment,
        unit_name: &str,
        rows: &[AssessmentResultRow],
    ) -> Result<Vec<u8>> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("Results")?;

        // ── Color palette ──
        let primary_color = Color::RGB(0x1E293B);
        let header_bg = Color::RGB(0x0F172A);
        let header_text = Color::White;
        let alt_row_1 = Color::RGB(0xF8FAFC);
        let alt_row_2 = Color::White;
        let border_color = Color::RGB(0xE2E8F0);

        let pass_high = Color::RGB(0x10B981);
        let pass_mid = Color::RGB(0xF59E0B);
        let pass_low = Color::RGB(0xEF4444);

        // ── Column definitions ──
        let columns = [
            ("#", 6.0),
            ("Registration No.", 20.0),
            ("Student", 32.0),
            ("Submitted At", 20.0),
            ("Total Marks", 14.0),
            ("Out Of", 10.0),
            ("Percentage", 14.0),
        ];
        for (i, (_, width)) in columns.iter().enumerate() {
            worksheet.set_column_width(i as u16, *width)?;
        }
        let last_col = (columns.len() - 1) as u16;

        // ── Title row ──
        let title_format = Format::new()
            .set_font_size(16)
            .set_bold()
            .set_font_color(header_text)
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);
        worksheet.set_row_height(0, 40)?;
        worksheet.merge_range(0, 0, 0, last_col, &assessment.title, &title_format)?;

        // ── Subtitle row ──
        let subtitle_format = Format::new()
            .set_font_size(10)
            .set_italic()
            .set_font_color(Color::RGB(0x94A3B8))
            .set_background_color(primary_color)
            .set_align(FormatAlign::CenterAcross)
            .set_align(FormatAlign::VerticalCenter);
        worksheet.set_row_height(1, 22)?;
        let now = chrono::Utc::now().format("%d.%m.%Y %H:%M UTC").to_string();
        let subtitle_text = format!(
            "{} • {} • Exported {} • Submissions: {}",
            unit_name, assessment.assessment_type, now, rows.len()
        );
        worksheet.merge_range(1, 0, 1, last_col, &subtitle_text, &subtitle_format)?;

        // ── Header row ──
        let header_format = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(header_text)
            .set_background_color(header_bg)
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);
        let header_row = 2;
        worksheet.set_row_height(header_row, 30)?;
        for (i, (name, _)) in columns.iter().enumerate() {
            worksheet.write_string_with_format(header_row, i as u16, *name, &header_format)?;
        }

        // ── Data rows ──
        let data_start_row = 3;
        for (idx, result) in rows.iter().enumerate() {
            let row = data_start_row + idx as u32;
            let bg = if idx % 2 == 0 { alt_row_1 } else { alt_row_2 };

            let base_fmt = Format::new()
                .set_font_size(10)
                .set_background_color(bg)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin)
                .set_border_color(border_color);
            let center_fmt = base_fmt.clone().set_align(FormatAlign::Center);
            let name_fmt = base_fmt.clone().set_bold();

            worksheet.set_row_height(row, 22)?;
            worksheet.write_number_with_format(row, 0, (idx + 1) as f64, &center_fmt)?;
            worksheet.write_string_with_format(row, 1, &result.registration_number, &base_fmt)?;
            let name = format!("{} {}", result.firstname, result.surname);
            worksheet.write_string_with_format(row, 2, &name, &name_fmt)?;
            let submitted = result.submitted_at.format("%d.%m.%Y %H:%M").to_string();
            worksheet.write_string_with_format(row, 3, &submitted, &center_fmt)?;
            worksheet.write_number_with_format(row, 5, assessment.total_marks, &center_fmt)?;

            match result.total_marks {
                Some(total) => {
                    worksheet.write_number_with_format(row, 4, total, &center_fmt)?;
                    match Self::percentage(total, assessment.total_marks) {
                        Some(pct) => {
                            let color = if pct >= 70.0 {
                                pass_high
                            } else if pct >= 40.0 {
                                pass_mid
                            } else {
                                pass_low
                            };
                            let pct_fmt = center_fmt
                                .clone()
                                .set_bold()
                                .set_font_color(color)
                                .set_num_format("0.0");
                            worksheet.write_number_with_format(row, 6, pct, &pct_fmt)?;
                        }
                        None => {
                            worksheet.write_string_with_format(row, 6, "-", &center_fmt)?;
                        }
                    }
                }
                None => {
                    worksheet.write_string_with_format(row, 4, "-", &center_fmt)?;
                    worksheet.write_string_with_format(row, 6, "-", &center_fmt)?;
                }
            }
        }

        // ── Summary row ──
        let total_row = data_start_row + rows.len() as u32 + 1;
        let summary_fmt = Format::new()
            .set_bold()
            .set_font_size(10)
            .set_font_color(primary_color)
            .set_background_color(Color::RGB(0xE0E7FF))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Thin)
            .set_border_color(border_color);
        worksheet.set_row_height(total_row, 26)?;

        let totals: Vec<f64> = rows.iter().filter_map(|r| r.total_marks).collect();
        let average = if totals.is_empty() {
            0.0
        } else {
            totals.iter().sum::<f64>() / totals.len() as f64
        };
        let highest = totals.iter().cloned().fold(f64::NAN, f64::max);
        let lowest = totals.iter().cloned().fold(f64::NAN, f64::min);
        let summary = if totals.is_empty() {
            "No graded submissions".to_string()
        } else {
            format!(
                "Average: {:.1} | Highest: {:.1} | Lowest: {:.1}",
                average, highest, lowest
            )
        };
        worksheet.merge_range(total_row, 0, total_row, 2, &format!("Total: {} students", rows.len()), &summary_fmt)?;
        worksheet.merge_range(total_row, 3, total_row, last_col, &summary, &summary_fmt)?;

        worksheet.set_freeze_panes(3, 0)?;
        worksheet.autofilter(
            2,
            0,
            (data_start_row + rows.len() as u32).saturating_sub(1).max(2),
            last_col,
        )?;

        let buffer = workbook.save_to_buffer()?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn assessment() -> Assessment {
        Assessment {
            id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            unit_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            title: "CAT 1".into(),
            description: "First CAT".into(),
            topic: "Recursion".into(),
            assessment_type: "CAT".into(),
            questions_type: vec!["open-ended".into()],
            total_marks: 20.0,
            number_of_questions: 2,
            difficulty: "Intermediate".into(),
            blooms_level: None,
            week: Some(3),
            verified: true,
            schedule_date: None,
            deadline: None,
            duration_minutes: Some(45),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn workbook_is_a_zip_archive() {
        let rows = vec![
            AssessmentResultRow {
                student_id: Uuid::new_v4(),
                registration_number: "SCT211-0001/2021".into(),
                firstname: "Amina".into(),
                surname: "Otieno".into(),
                submission_id: Uuid::new_v4(),
                submitted_at: Utc::now(),
                total_marks: Some(14.5),
            },
            AssessmentResultRow {
                student_id: Uuid::new_v4(),
                registration_number: "SCT211-0002/2021".into(),
                firstname: "Brian".into(),
                surname: "Kamau".into(),
                submission_id: Uuid::new_v4(),
                submitted_at: Utc::now(),
                total_marks: None,
            },
        ];
        let bytes = ExportService::generate_results_xlsx(&assessment(), "Data Structures", &rows).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn empty_results_still_export() {
        let bytes = ExportService::generate_results_xlsx(&assessment(), "Data Structures", &[]).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn percentage_needs_positive_maximum() {
        assert_eq!(ExportService::percentage(10.0, 20.0), Some(50.0));
        assert_eq!(ExportService::percentage(10.0, 0.0), None);
    }
}
