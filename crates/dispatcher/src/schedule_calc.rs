use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc,
};
use tracing::{debug, warn};

use media_scheduler_core::{
    models::ScheduleKind, SchedulerError, SchedulerResult, TaskSchedule,
};

const WEEKDAY_NAMES: [&str; 7] = ["周一", "周二", "周三", "周四", "周五", "周六", "周日"];

/// 每日/每周执行时间的计算工具
pub struct ScheduleCalculator;

impl ScheduleCalculator {
    /// 校验执行时间配置
    pub fn validate(schedule: &TaskSchedule) -> SchedulerResult<()> {
        if schedule.hour > 23 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "小时必须在 0-23 之间: {}",
                schedule.hour
            )));
        }
        if schedule.minute > 59 {
            return Err(SchedulerError::InvalidSchedule(format!(
                "分钟必须在 0-59 之间: {}",
                schedule.minute
            )));
        }
        for day in [schedule.day_of_week, schedule.second_day_of_week]
            .into_iter()
            .flatten()
        {
            if day > 6 {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "星期必须在 0-6 之间: {day}"
                )));
            }
        }
        if schedule.kind == ScheduleKind::Weekly && schedule.day_of_week.is_none() {
            return Err(SchedulerError::InvalidSchedule(
                "每周任务必须指定 dayOfWeek".to_string(),
            ));
        }
        Ok(())
    }

    /// 计算严格晚于 `now` 的下一次执行时间（按 `now` 所在时区的本地时间）
    pub fn next_run<Tz: TimeZone>(
        schedule: &TaskSchedule,
        now: &DateTime<Tz>,
    ) -> SchedulerResult<DateTime<Tz>> {
        Self::validate(schedule)?;
        let today = now.date_naive();

        let next = match schedule.kind {
            ScheduleKind::Daily => {
                let mut candidate = Self::local_at(now, today, schedule)?;
                if candidate <= *now {
                    candidate = Self::local_at(now, today + Duration::days(1), schedule)?;
                }
                // 夏令时回拨等情况下再确认一次
                if candidate <= *now {
                    warn!("计算出的执行时间 {:?} 不晚于当前时间，顺延一天", candidate);
                    candidate = Self::local_at(now, today + Duration::days(2), schedule)?;
                }
                candidate
            }
            ScheduleKind::Weekly => {
                let current = now.weekday().num_days_from_monday();
                let mut best: Option<DateTime<Tz>> = None;
                for target in [schedule.day_of_week, schedule.second_day_of_week]
                    .into_iter()
                    .flatten()
                {
                    let offset = (target + 7 - current) % 7;
                    let mut candidate =
                        Self::local_at(now, today + Duration::days(offset as i64), schedule)?;
                    if candidate <= *now {
                        candidate = Self::local_at(
                            now,
                            today + Duration::days(offset as i64 + 7),
                            schedule,
                        )?;
                    }
                    best = match best {
                        Some(existing) if existing <= candidate => Some(existing),
                        _ => Some(candidate),
                    };
                }
                best.ok_or_else(|| {
                    SchedulerError::InvalidSchedule("每周任务必须指定 dayOfWeek".to_string())
                })?
            }
        };

        debug!("下次执行时间: {:?} ({})", next, Self::describe(schedule));
        Ok(next)
    }

    /// 以本机时区计算，返回 UTC 时间
    pub fn next_run_utc(schedule: &TaskSchedule, now: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        let local_now = now.with_timezone(&Local);
        Ok(Self::next_run(schedule, &local_now)?.with_timezone(&Utc))
    }

    /// 指定日期的 `hour:minute`；落在夏令时空档中时向后顺延一小时
    fn local_at<Tz: TimeZone>(
        reference: &DateTime<Tz>,
        date: NaiveDate,
        schedule: &TaskSchedule,
    ) -> SchedulerResult<DateTime<Tz>> {
        let tz = reference.timezone();
        let naive = date
            .and_hms_opt(schedule.hour, schedule.minute, 0)
            .ok_or_else(|| {
                SchedulerError::InvalidSchedule(format!(
                    "无效的时间 {:02}:{:02}",
                    schedule.hour, schedule.minute
                ))
            })?;

        tz.from_local_datetime(&naive)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
            .ok_or_else(|| {
                SchedulerError::InvalidSchedule(format!("本地时间 {naive} 不存在"))
            })
    }

    /// 执行时间是否已经过去超过宽限期
    pub fn is_overdue(next_run: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> bool {
        now > next_run + grace
    }

    /// 距离下次执行还有多久
    pub fn time_until_next(schedule: &TaskSchedule, now: DateTime<Utc>) -> SchedulerResult<Duration> {
        Ok(Self::next_run_utc(schedule, now)? - now)
    }

    /// 执行频率描述，用于日志
    pub fn describe(schedule: &TaskSchedule) -> String {
        let time = format!("{:02}:{:02}", schedule.hour, schedule.minute);
        match schedule.kind {
            ScheduleKind::Daily => format!("每天 {time}"),
            ScheduleKind::Weekly => {
                let days: Vec<&str> = [schedule.day_of_week, schedule.second_day_of_week]
                    .into_iter()
                    .flatten()
                    .filter_map(|d| WEEKDAY_NAMES.get(d as usize).copied())
                    .collect();
                format!("每{} {time}", days.join("、"))
            }
        }
    }
}
