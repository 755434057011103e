use chrono::{Datelike, Duration, TimeZone, Timelike, Utc};

use media_scheduler_core::TaskSchedule;
use media_scheduler_dispatcher::schedule_calc::ScheduleCalculator;
use media_scheduler_testing_utils::utc;

#[test]
fn test_daily_next_run_after_morning_slot() {
    // 10:00 时每日 09:00 的任务应排到第二天
    let now = utc(2024, 1, 1, 10, 0);
    let next = ScheduleCalculator::next_run(&TaskSchedule::daily(9, 0), &now).unwrap();
    assert_eq!(next, utc(2024, 1, 2, 9, 0));
}

#[test]
fn test_weekly_dual_day_picks_wednesday() {
    // 2024-01-01 是周一，周三(2)/周六(5) 20:00
    let now = utc(2024, 1, 1, 0, 0);
    let schedule = TaskSchedule::twice_weekly(2, 5, 20, 0);
    let next = ScheduleCalculator::next_run(&schedule, &now).unwrap();
    assert_eq!(next, utc(2024, 1, 3, 20, 0));

    // 顺序颠倒结果不变
    let reversed = TaskSchedule::twice_weekly(5, 2, 20, 0);
    assert_eq!(ScheduleCalculator::next_run(&reversed, &now).unwrap(), next);
}

#[test]
fn test_weekly_dual_day_after_first_day() {
    // 周三 21:00，周三的时间已过，下一个是周六
    let now = utc(2024, 1, 3, 21, 0);
    let schedule = TaskSchedule::twice_weekly(2, 5, 20, 0);
    assert_eq!(
        ScheduleCalculator::next_run(&schedule, &now).unwrap(),
        utc(2024, 1, 6, 20, 0)
    );
}

#[test]
fn test_daily_next_run_is_strictly_later_with_matching_time() {
    let start = utc(2024, 3, 1, 0, 0);
    for step in 0..(24 * 12) {
        let now = start + Duration::minutes(step * 5 + 1);
        for (hour, minute) in [(0, 0), (9, 0), (12, 30), (23, 59)] {
            let next = ScheduleCalculator::next_run(&TaskSchedule::daily(hour, minute), &now).unwrap();
            assert!(next > now, "{next} should be after {now}");
            assert!(next - now <= Duration::days(1));
            assert_eq!((next.hour(), next.minute()), (hour, minute));
        }
    }
}

#[test]
fn test_weekly_dual_day_is_minimum_of_single_days() {
    let start = utc(2024, 5, 6, 0, 0);
    for step in 0..(7 * 24) {
        let now = start + Duration::hours(step) + Duration::minutes(17);
        for (a, b) in [(0, 3), (2, 5), (6, 1), (4, 4)] {
            let dual =
                ScheduleCalculator::next_run(&TaskSchedule::twice_weekly(a, b, 8, 15), &now).unwrap();
            let first = ScheduleCalculator::next_run(&TaskSchedule::weekly(a, 8, 15), &now).unwrap();
            let second = ScheduleCalculator::next_run(&TaskSchedule::weekly(b, 8, 15), &now).unwrap();
            assert_eq!(dual, first.min(second));
            assert!(dual > now);
            assert!(dual - now <= Duration::days(7));
            let weekday = dual.weekday().num_days_from_monday();
            assert!(weekday == a || weekday == b);
        }
    }
}

#[test]
fn test_next_run_utc_is_in_the_future() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
    let next = ScheduleCalculator::next_run_utc(&TaskSchedule::weekly(6, 3, 0), now).unwrap();
    assert!(next > now);
    assert!(next - now <= Duration::days(7) + Duration::hours(1));

    let until = ScheduleCalculator::time_until_next(&TaskSchedule::daily(0, 0), now).unwrap();
    assert!(until > Duration::zero());
}

#[test]
fn test_invalid_schedule_is_rejected() {
    let now = utc(2024, 1, 1, 0, 0);
    assert!(ScheduleCalculator::next_run(&TaskSchedule::daily(25, 0), &now).is_err());
    assert!(ScheduleCalculator::next_run(&TaskSchedule::twice_weekly(1, 9, 0, 0), &now).is_err());
}
